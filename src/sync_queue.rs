use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::SqlWritebackError;
use crate::pool::ConnectionPool;
use crate::query_builder::StatementBuilder;
use crate::results::WriteResult;
use crate::translation::translate_dialect;
use crate::types::QueryAndParams;
use crate::writer::WriteLogging;

/// A private statement queue that is written only when its owner calls
/// [`SyncWriteQueue::write_queue`].
///
/// It shares the write pool with the background writer but not its buffer. Nothing is retried
/// here: the result of `write_queue` carries the statements to resubmit.
pub struct SyncWriteQueue {
    queue: Mutex<Vec<QueryAndParams>>,
    pool: ConnectionPool,
    builder: StatementBuilder,
    logging: Arc<WriteLogging>,
}

impl SyncWriteQueue {
    pub(crate) fn new(
        pool: ConnectionPool,
        builder: StatementBuilder,
        logging: Arc<WriteLogging>,
    ) -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            pool,
            builder,
            logging,
        }
    }

    /// Queue a statement, translated to the pool's dialect.
    pub async fn queue(&self, statement: impl Into<QueryAndParams>) {
        let QueryAndParams { query, params } = statement.into();
        let query = translate_dialect(&query, self.builder.dialect()).into_owned();
        self.queue.lock().await.push(QueryAndParams { query, params });
    }

    pub async fn queue_all<I>(&self, statements: I)
    where
        I: IntoIterator<Item = QueryAndParams>,
    {
        let dialect = self.builder.dialect();
        let translated = statements.into_iter().map(|s| QueryAndParams {
            query: translate_dialect(&s.query, dialect).into_owned(),
            params: s.params,
        });
        self.queue.lock().await.extend(translated);
    }

    /// # Errors
    /// Returns `SqlWritebackError::ParameterError` when `values` is empty.
    pub async fn queue_insert<I, K, V>(&self, table: &str, values: I) -> Result<(), SqlWritebackError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let statement = self.builder.insert(table, values)?;
        self.queue.lock().await.push(statement);
        Ok(())
    }

    /// # Errors
    /// Returns `SqlWritebackError::ParameterError` when either mapping is empty.
    pub async fn queue_update<I, K, V, C, CK, CV>(
        &self,
        table: &str,
        values: I,
        conditions: C,
    ) -> Result<(), SqlWritebackError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
        C: IntoIterator<Item = (CK, CV)>,
        CK: AsRef<str>,
        CV: AsRef<str>,
    {
        let statement = self.builder.update(table, values, conditions)?;
        self.queue.lock().await.push(statement);
        Ok(())
    }

    /// # Errors
    /// Returns `SqlWritebackError::ParameterError` when `conditions` is empty.
    pub async fn queue_delete<C, CK, CV>(&self, table: &str, conditions: C) -> Result<(), SqlWritebackError>
    where
        C: IntoIterator<Item = (CK, CV)>,
        CK: AsRef<str>,
        CV: AsRef<str>,
    {
        let statement = self.builder.delete(table, conditions)?;
        self.queue.lock().await.push(statement);
        Ok(())
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Write everything queued in one transaction and clear the queue.
    ///
    /// The queue stays locked for the whole cycle, so statements queued meanwhile land in the
    /// next call. Once a connection is held the write runs on its own task and completes
    /// even if the returned future is dropped.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ConnectionError` if the pool is closed; the queue is left
    /// untouched in that case.
    pub async fn write_queue(&self) -> Result<WriteResult, SqlWritebackError> {
        let mut queue = self.queue.lock().await;
        if queue.is_empty() {
            return Ok(WriteResult::Empty);
        }
        let mut conn = self.pool.acquire().await?;
        let batch = std::mem::take(&mut *queue);
        let logging = Arc::clone(&self.logging);
        // the taken batch is written even if this future is dropped
        tokio::spawn(async move {
            let result = conn.write(batch).await;
            drop(conn);
            logging.report(&result);
            result
        })
        .await
        .map_err(SqlWritebackError::from)
    }
}

impl std::fmt::Debug for SyncWriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncWriteQueue")
            .field("pool", &self.pool)
            .field("dialect", &self.builder.dialect())
            .finish_non_exhaustive()
    }
}
