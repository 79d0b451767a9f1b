//! Background write path.
//!
//! Producers enqueue into a [`WriteBuffer`]; a periodic task (or the host) calls
//! [`SqlWriter::flush`], which drains everything buffered at that instant and writes it as one
//! transaction on a pooled connection. Only one flush runs at a time; overlapping calls return
//! [`FlushOutcome::Skipped`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::buffer::{PendingStatement, WriteBuffer};
use crate::error::SqlWritebackError;
use crate::pool::{ConnectionPool, PooledConnection};
use crate::query_builder::StatementBuilder;
use crate::results::WriteResult;
use crate::translation::Dialect;
use crate::types::QueryAndParams;

/// What a call to [`SqlWriter::flush`] did.
#[derive(Debug)]
pub enum FlushOutcome {
    /// Another flush was running, or the writer has shut down.
    Skipped,
    /// Nothing was buffered.
    Empty,
    /// A batch was written; the result says how it went.
    Written(WriteResult),
}

/// Logging switches shared by the async writer and sync queues.
#[derive(Debug)]
pub(crate) struct WriteLogging {
    log_sql: AtomicBool,
    log_write_errors: AtomicBool,
}

impl WriteLogging {
    pub(crate) fn new(log_sql: bool, log_write_errors: bool) -> Self {
        Self {
            log_sql: AtomicBool::new(log_sql),
            log_write_errors: AtomicBool::new(log_write_errors),
        }
    }

    pub(crate) fn set_log_sql(&self, enabled: bool) {
        self.log_sql.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn set_log_write_errors(&self, enabled: bool) {
        self.log_write_errors.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn report(&self, result: &WriteResult) {
        match result {
            WriteResult::Empty => {}
            WriteResult::Success { committed } => {
                if self.log_sql.load(Ordering::Relaxed) {
                    for statement in committed {
                        tracing::info!(target: "sql_writeback::sql", statement = %statement.query, "executed");
                    }
                }
            }
            WriteResult::Disabled { discarded } => {
                tracing::warn!(
                    count = discarded.len(),
                    "write connection is locked; batch rolled back"
                );
            }
            WriteResult::Error {
                failed,
                cause,
                remaining,
            } => {
                if self.log_write_errors.load(Ordering::Relaxed) {
                    match failed {
                        Some(failed) => tracing::error!(
                            statement = %failed.statement.query,
                            position = failed.position,
                            remaining = remaining.len(),
                            error = %cause,
                            "statement failed; batch rolled back"
                        ),
                        None => tracing::error!(
                            remaining = remaining.len(),
                            error = %cause,
                            "batch write failed; batch rolled back"
                        ),
                    }
                }
            }
        }
    }
}

/// Options for [`SqlWriter::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    pub dialect: Dialect,
    pub log_sql: bool,
    pub log_write_errors: bool,
}

impl WriterOptions {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            log_sql: false,
            log_write_errors: true,
        }
    }
}

struct Ticker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct WriterInner {
    buffer: WriteBuffer,
    pool: ConnectionPool,
    builder: StatementBuilder,
    logging: Arc<WriteLogging>,
    // true while a flush (or the shutdown drain) owns the buffer's output side.
    active: watch::Sender<bool>,
    stopped: AtomicBool,
    // set once the shutdown drain has finished
    finished: watch::Sender<bool>,
    ticker: Mutex<Option<Ticker>>,
}

/// Buffered, ordered, non-blocking writes with periodic flushing.
///
/// Cloning is cheap; all clones share one buffer and one flush guard.
#[derive(Clone)]
pub struct SqlWriter {
    inner: Arc<WriterInner>,
}

/// Clears the active flag when a flush ends, however it ends.
struct ActiveGuard<'a>(&'a watch::Sender<bool>);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl SqlWriter {
    /// Build a writer over `pool` (which should hold writable connections).
    #[must_use]
    pub fn new(pool: ConnectionPool, options: WriterOptions) -> Self {
        let (active, _) = watch::channel(false);
        let (finished, _) = watch::channel(false);
        Self {
            inner: Arc::new(WriterInner {
                buffer: WriteBuffer::new(options.dialect),
                pool,
                builder: StatementBuilder::new(options.dialect),
                logging: Arc::new(WriteLogging::new(options.log_sql, options.log_write_errors)),
                active,
                stopped: AtomicBool::new(false),
                finished,
                ticker: Mutex::new(None),
            }),
        }
    }

    /// Start flushing every `interval` on a background task. The first flush happens one
    /// interval from now. Calling this again replaces the previous schedule.
    pub async fn start(&self, interval: Duration) {
        let cancel = CancellationToken::new();
        let writer = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // consume initial immediate tick
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = writer.flush().await {
                            tracing::error!(error = %err, "scheduled flush failed");
                        }
                    }
                }
            }
        });
        let previous = self
            .inner
            .ticker
            .lock()
            .await
            .replace(Ticker { cancel, handle });
        if let Some(previous) = previous {
            previous.cancel.cancel();
            let _ = previous.handle.await;
        }
    }

    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn buffer(&self) -> &WriteBuffer {
        &self.inner.buffer
    }

    #[must_use]
    pub fn statements(&self) -> &StatementBuilder {
        &self.inner.builder
    }

    pub(crate) fn logging(&self) -> Arc<WriteLogging> {
        Arc::clone(&self.inner.logging)
    }

    /// Buffer a statement (translated to the active dialect). Never waits.
    pub fn enqueue(&self, statement: impl Into<QueryAndParams>) -> u64 {
        self.inner.buffer.enqueue(statement.into())
    }

    /// Buffer a statement without dialect translation.
    pub fn enqueue_raw(&self, statement: impl Into<QueryAndParams>) -> u64 {
        self.inner.buffer.enqueue_raw(statement.into())
    }

    pub fn enqueue_all<I>(&self, statements: I) -> Vec<u64>
    where
        I: IntoIterator<Item = QueryAndParams>,
    {
        self.inner.buffer.enqueue_all(statements)
    }

    /// Buffer a `CREATE TABLE IF NOT EXISTS`.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ParameterError` when `fields` is empty.
    pub fn create_table<I, S>(&self, table: &str, fields: I) -> Result<u64, SqlWritebackError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let statement = self.inner.builder.create_table(table, fields)?;
        Ok(self.inner.buffer.enqueue_raw(statement))
    }

    /// Buffer an INSERT built from column/value pairs.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ParameterError` when `values` is empty.
    pub fn insert<I, K, V>(&self, table: &str, values: I) -> Result<u64, SqlWritebackError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let statement = self.inner.builder.insert(table, values)?;
        Ok(self.inner.buffer.enqueue_raw(statement))
    }

    /// Buffer an UPDATE built from column/value and column/condition pairs.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ParameterError` when either mapping is empty.
    pub fn update<I, K, V, C, CK, CV>(
        &self,
        table: &str,
        values: I,
        conditions: C,
    ) -> Result<u64, SqlWritebackError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
        C: IntoIterator<Item = (CK, CV)>,
        CK: AsRef<str>,
        CV: AsRef<str>,
    {
        let statement = self.inner.builder.update(table, values, conditions)?;
        Ok(self.inner.buffer.enqueue_raw(statement))
    }

    /// Buffer a DELETE built from column/condition pairs.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ParameterError` when `conditions` is empty.
    pub fn delete<C, CK, CV>(&self, table: &str, conditions: C) -> Result<u64, SqlWritebackError>
    where
        C: IntoIterator<Item = (CK, CV)>,
        CK: AsRef<str>,
        CV: AsRef<str>,
    {
        let statement = self.inner.builder.delete(table, conditions)?;
        Ok(self.inner.buffer.enqueue_raw(statement))
    }

    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.inner.buffer.len()
    }

    #[must_use]
    pub fn pending_statements(&self) -> Vec<QueryAndParams> {
        self.inner.buffer.pending()
    }

    #[must_use]
    pub fn is_flush_active(&self) -> bool {
        *self.inner.active.borrow()
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Connections of the write pool currently checked out.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.inner.pool.active_count()
    }

    pub fn set_log_sql(&self, enabled: bool) {
        self.inner.logging.set_log_sql(enabled);
    }

    pub fn set_log_write_errors(&self, enabled: bool) {
        self.inner.logging.set_log_write_errors(enabled);
    }

    /// Make every later write roll back instead of committing.
    pub fn lock_writes(&self) {
        self.inner.pool.lock_all();
    }

    fn try_claim(&self) -> bool {
        self.inner.active.send_if_modified(|active| {
            if *active {
                false
            } else {
                *active = true;
                true
            }
        })
    }

    /// Drain the buffer and write the snapshot as one transaction.
    ///
    /// The buffer is drained once a connection is in hand; statements enqueued after that wait
    /// for the next flush. If a statement fails, the rest of the batch goes back into the
    /// buffer under its original sequence ids and is retried by the next flush, ahead of
    /// newer statements.
    ///
    /// The flush runs on its own task: dropping the returned future (a timeout, a `select!`)
    /// does not cancel it.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ConnectionError` if the pool is closed; nothing is drained
    /// in that case.
    pub async fn flush(&self) -> Result<FlushOutcome, SqlWritebackError> {
        if self.is_stopped() || !self.try_claim() {
            return Ok(FlushOutcome::Skipped);
        }
        let writer = self.clone();
        tokio::spawn(async move {
            let _active = ActiveGuard(&writer.inner.active);
            writer.flush_claimed().await
        })
        .await?
    }

    async fn flush_claimed(&self) -> Result<FlushOutcome, SqlWritebackError> {
        if self.inner.buffer.is_empty() {
            return Ok(FlushOutcome::Empty);
        }
        let mut conn = self.inner.pool.acquire().await?;
        let batch = self.inner.buffer.drain();
        if batch.is_empty() {
            return Ok(FlushOutcome::Empty);
        }
        tracing::debug!(count = batch.len(), "flushing write buffer");
        let (result, unwritten) = self.write_batch(&mut conn, batch).await;
        drop(conn);
        if !unwritten.is_empty() {
            tracing::debug!(count = unwritten.len(), "requeued unwritten statements");
            self.inner.buffer.restore(unwritten);
        }
        Ok(FlushOutcome::Written(result))
    }

    /// Write `batch` on `conn`. Returns the result and the statements that were not
    /// committed and should be retried.
    async fn write_batch(
        &self,
        conn: &mut PooledConnection,
        batch: Vec<PendingStatement>,
    ) -> (WriteResult, Vec<PendingStatement>) {
        let (ids, statements): (Vec<u64>, Vec<QueryAndParams>) = batch
            .into_iter()
            .map(|p| (p.sequence_id, p.statement))
            .unzip();
        let result = conn.write(statements).await;
        self.inner.logging.report(&result);

        let unwritten = match &result {
            WriteResult::Empty | WriteResult::Success { .. } => Vec::new(),
            WriteResult::Disabled { discarded } => pair(&ids, discarded, None),
            WriteResult::Error {
                failed, remaining, ..
            } => pair(&ids, remaining, failed.as_ref().map(|f| f.position)),
        };
        (result, unwritten)
    }

    /// Resolves once no flush is running and the buffer is empty, or the writer has stopped.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.inner.active.subscribe();
        loop {
            let active = *rx.borrow_and_update();
            if self.is_stopped() || (!active && self.inner.buffer.is_empty()) {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Run `callback` on a background task once the current writes are done
    /// (see [`SqlWriter::wait_until_idle`]).
    pub fn after_write<F, Fut>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let writer = self.clone();
        tokio::spawn(async move {
            writer.wait_until_idle().await;
            callback().await;
        })
    }

    /// Stop the schedule, wait for an in-flight flush, then drain and write whatever is left
    /// before closing the write pool.
    ///
    /// Statements enqueued up to the final drain are written. Failed statements are dropped
    /// from the final drain one at a time and the rest retried; anything that still cannot be
    /// committed is logged and discarded.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ConnectionError` if the pool was already closed.
    pub async fn shutdown(&self) -> Result<(), SqlWritebackError> {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            let mut finished = self.inner.finished.subscribe();
            let _ = finished.wait_for(|done| *done).await;
            return Ok(());
        }
        let writer = self.clone();
        tokio::spawn(async move { writer.shutdown_stopped().await }).await?
    }

    async fn shutdown_stopped(&self) -> Result<(), SqlWritebackError> {
        if let Some(ticker) = self.inner.ticker.lock().await.take() {
            ticker.cancel.cancel();
            let _ = ticker.handle.await;
        }

        let mut rx = self.inner.active.subscribe();
        loop {
            let closed = rx.wait_for(|active| !*active).await.is_err();
            if closed {
                break;
            }
            if self.try_claim() {
                break;
            }
        }

        let outcome = self.final_drain().await;
        self.inner.pool.close();
        self.inner.active.send_replace(false);
        self.inner.finished.send_replace(true);
        outcome
    }

    async fn final_drain(&self) -> Result<(), SqlWritebackError> {
        if self.inner.buffer.is_empty() {
            return Ok(());
        }
        let mut conn = match self.inner.pool.acquire().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::error!(
                    count = self.inner.buffer.len(),
                    error = %err,
                    "could not save write buffer"
                );
                return Err(err);
            }
        };
        let mut batch = self.inner.buffer.drain();
        tracing::info!(count = batch.len(), "saving write buffer before shutdown");
        while !batch.is_empty() {
            let before = batch.len();
            let (result, unwritten) = self.write_batch(&mut conn, batch).await;
            let progressed = matches!(
                result,
                WriteResult::Error {
                    failed: Some(_),
                    ..
                }
            ) && unwritten.len() < before;
            if !progressed {
                if !unwritten.is_empty() {
                    tracing::error!(
                        count = unwritten.len(),
                        status = %result.status(),
                        "discarding statements that could not be saved at shutdown"
                    );
                }
                break;
            }
            batch = unwritten;
        }
        Ok(())
    }
}

/// Re-attach sequence ids to `statements`, which are `ids` in order with the entry at
/// `removed` taken out.
fn pair(ids: &[u64], statements: &[QueryAndParams], removed: Option<usize>) -> Vec<PendingStatement> {
    ids.iter()
        .enumerate()
        .filter(|(position, _)| Some(*position) != removed)
        .map(|(_, id)| *id)
        .zip(statements.iter().cloned())
        .map(|(sequence_id, statement)| PendingStatement {
            sequence_id,
            statement,
        })
        .collect()
}
