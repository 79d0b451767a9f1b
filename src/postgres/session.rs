use std::fmt;

use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};

use crate::error::SqlWritebackError;
use crate::results::QueryResult;
use crate::types::QueryAndParams;

use super::config::PostgresOptions;
use super::params::Params;
use super::query::build_query_result;

/// One open Postgres session; the protocol driver runs on a spawned task.
pub struct PostgresSession {
    client: Client,
    driver: JoinHandle<()>,
}

impl PostgresSession {
    /// # Errors
    /// Returns `SqlWritebackError::PostgresError` if the connection or role setup fails.
    pub async fn open(options: &PostgresOptions, read_only: bool) -> Result<Self, SqlWritebackError> {
        let (client, connection) = options.to_pg_config().connect(NoTls).await?;
        let driver = tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::warn!(error = %err, "postgres connection closed with error");
            }
        });
        let session = Self { client, driver };
        let characteristics = if read_only { "READ ONLY" } else { "READ WRITE" };
        session
            .client
            .batch_execute(&format!(
                "SET SESSION CHARACTERISTICS AS TRANSACTION {characteristics}"
            ))
            .await?;
        Ok(session)
    }

    /// Whether the session is open and its read/write mode matches the role.
    ///
    /// Before a write, any transaction left open by an interrupted write is rolled back.
    pub async fn is_valid(&self, read_only: bool, for_write: bool) -> bool {
        if self.client.is_closed() {
            return false;
        }
        if !read_only && for_write {
            if let Err(err) = self.client.batch_execute("ROLLBACK").await {
                tracing::debug!(error = %err, "postgres rollback of leftover transaction failed");
                return false;
            }
        }
        match self
            .client
            .query_one("SHOW default_transaction_read_only", &[])
            .await
        {
            Ok(row) => {
                let mode: String = match row.try_get(0) {
                    Ok(mode) => mode,
                    Err(_) => return false,
                };
                (mode == "on") == read_only
            }
            Err(err) => {
                tracing::debug!(error = %err, "postgres validity check failed");
                false
            }
        }
    }

    /// # Errors
    /// Returns `SqlWritebackError::PostgresError` if `BEGIN` fails.
    pub async fn begin(&self) -> Result<(), SqlWritebackError> {
        Ok(self.client.batch_execute("BEGIN").await?)
    }

    /// # Errors
    /// Returns `SqlWritebackError::PostgresError` if `COMMIT` fails.
    pub async fn commit(&self) -> Result<(), SqlWritebackError> {
        Ok(self.client.batch_execute("COMMIT").await?)
    }

    /// # Errors
    /// Returns `SqlWritebackError::PostgresError` if `ROLLBACK` fails.
    pub async fn rollback(&self) -> Result<(), SqlWritebackError> {
        Ok(self.client.batch_execute("ROLLBACK").await?)
    }

    /// # Errors
    /// Returns `SqlWritebackError::PostgresError` if preparing or executing fails.
    pub async fn execute(&self, statement: &QueryAndParams) -> Result<usize, SqlWritebackError> {
        let prepared = self.client.prepare(&statement.query).await?;
        let params = Params::convert(&statement.params);
        let rows = self.client.execute(&prepared, params.as_refs()).await?;
        usize::try_from(rows).map_err(|e| {
            SqlWritebackError::ExecutionError(format!("postgres affected rows conversion error: {e}"))
        })
    }

    /// # Errors
    /// Returns `SqlWritebackError::PostgresError` if preparing, running or decoding fails.
    pub async fn query(&self, statement: &QueryAndParams) -> Result<QueryResult, SqlWritebackError> {
        let prepared = self.client.prepare(&statement.query).await?;
        let params = Params::convert(&statement.params);
        let rows = self.client.query(&prepared, params.as_refs()).await?;
        build_query_result(&prepared, &rows)
    }
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl fmt::Debug for PostgresSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresSession")
            .field("closed", &self.client.is_closed())
            .finish_non_exhaustive()
    }
}
