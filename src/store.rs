use std::sync::Arc;

use crate::backend::Backend;
use crate::config::StoreConfig;
use crate::error::SqlWritebackError;
use crate::events::{EventSink, TracingEventSink};
use crate::pool::ConnectionPool;
use crate::query_builder::StatementBuilder;
use crate::results::QueryResult;
use crate::sync_queue::SyncWriteQueue;
use crate::translation::translate_dialect;
use crate::types::{DatabaseType, QueryAndParams};
use crate::writer::{SqlWriter, WriterOptions};

/// Entry point: one backend, a writable pool behind a buffered writer, and a read-only pool
/// for on-demand queries.
///
/// ```rust,no_run
/// use sql_writeback::prelude::*;
///
/// # async fn demo() -> Result<(), SqlWritebackError> {
/// let store = SqlStore::connect(StoreConfig::sqlite("app.db")).await?;
/// store.writer().create_table("kv", ["k TEXT PRIMARY KEY", "v TEXT"])?;
/// store.writer().insert("kv", [("k", "a"), ("v", "1")])?;
/// store.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct SqlStore {
    backend: Arc<Backend>,
    writer: SqlWriter,
    read_pool: ConnectionPool,
    name: String,
}

impl SqlStore {
    /// Connect using the tracing-backed event sink.
    ///
    /// # Errors
    /// See [`SqlStore::connect_with_events`].
    pub async fn connect(config: StoreConfig) -> Result<Self, SqlWritebackError> {
        Self::connect_with_events(config, Arc::new(TracingEventSink)).await
    }

    /// Validate `config`, build both pools, open the first write session, and start the
    /// periodic flush.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ConfigError` for an invalid config, or the driver error if
    /// the first write session cannot be opened.
    pub async fn connect_with_events(
        config: StoreConfig,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, SqlWritebackError> {
        let backend = Arc::new(Backend::from_config(&config)?);
        let write_pool = ConnectionPool::new(
            Arc::clone(&backend),
            config.write_pool_size,
            false,
            Arc::clone(&events),
            &config.name,
        )?;
        let read_pool = ConnectionPool::new(
            Arc::clone(&backend),
            config.read_pool_size,
            true,
            events,
            &config.name,
        )?;

        {
            let mut first = write_pool.acquire().await?;
            first.open().await?;
        }

        let writer = SqlWriter::new(
            write_pool,
            WriterOptions {
                dialect: backend.dialect(),
                log_sql: config.log_sql,
                log_write_errors: config.log_write_errors,
            },
        );
        writer.start(config.flush_interval()).await;
        tracing::info!(
            name = %config.name,
            backend = ?backend.database_type(),
            interval_ms = config.flush_interval_ms,
            "sql store started"
        );

        Ok(Self {
            backend,
            writer,
            read_pool,
            name: config.name,
        })
    }

    #[must_use]
    pub fn database_type(&self) -> DatabaseType {
        self.backend.database_type()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn writer(&self) -> &SqlWriter {
        &self.writer
    }

    #[must_use]
    pub fn read_pool(&self) -> &ConnectionPool {
        &self.read_pool
    }

    #[must_use]
    pub fn statements(&self) -> &StatementBuilder {
        self.writer.statements()
    }

    /// A new caller-flushed queue sharing the write pool.
    #[must_use]
    pub fn sync_queue(&self) -> SyncWriteQueue {
        SyncWriteQueue::new(
            self.writer.pool().clone(),
            *self.writer.statements(),
            self.writer.logging(),
        )
    }

    /// Run a query on a read-only connection, waiting for one if all are busy.
    ///
    /// Failures come back inside the [`QueryResult`].
    pub async fn read(&self, statement: impl Into<QueryAndParams>) -> QueryResult {
        let QueryAndParams { query, params } = statement.into();
        let statement = QueryAndParams {
            query: translate_dialect(&query, self.backend.dialect()).into_owned(),
            params,
        };
        match self.read_pool.acquire().await {
            Ok(mut conn) => conn.read(&statement).await,
            Err(err) => QueryResult::from_error(err, statement.query),
        }
    }

    /// Make every later write roll back instead of committing.
    pub fn lock_writes(&self) {
        self.writer.lock_writes();
    }

    /// Stop the flush schedule, write what is still buffered, then close both pools.
    ///
    /// # Errors
    /// Propagates the error of the final drain; the read pool is closed regardless.
    pub async fn shutdown(&self) -> Result<(), SqlWritebackError> {
        let outcome = self.writer.shutdown().await;
        self.read_pool.close();
        tracing::info!(name = %self.name, "sql store stopped");
        outcome
    }
}

impl std::fmt::Debug for SqlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlStore")
            .field("name", &self.name)
            .field("backend", &self.backend)
            .field("read_pool", &self.read_pool)
            .finish_non_exhaustive()
    }
}
