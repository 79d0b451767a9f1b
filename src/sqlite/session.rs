use std::fmt;
use std::sync::Arc;

use rusqlite::params_from_iter;
use tokio::sync::Mutex;

use crate::error::SqlWritebackError;
use crate::results::QueryResult;
use crate::types::QueryAndParams;

use super::config::SqliteOptions;
use super::params::Params;
use super::query::build_query_result;

pub(crate) type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// One open `SQLite` session. All driver calls hop to the blocking pool.
pub struct SqliteSession {
    conn: SharedSqliteConnection,
}

impl SqliteSession {
    /// # Errors
    /// Returns `SqlWritebackError` if the file cannot be opened for the requested role.
    pub async fn open(options: &SqliteOptions, read_only: bool) -> Result<Self, SqlWritebackError> {
        let options = options.clone();
        let conn = tokio::task::spawn_blocking(move || options.open_blocking(read_only)).await??;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Whether the session matches its role and, for writes, is free to start a transaction.
    ///
    /// A writable session found inside a leftover transaction is rolled back first.
    pub async fn is_valid(&self, read_only: bool, for_write: bool) -> bool {
        let checked = run_blocking(Arc::clone(&self.conn), move |conn| {
            let query_only: i64 = conn.query_row("PRAGMA query_only", [], |row| row.get(0))?;
            if (query_only != 0) != read_only {
                return Ok(false);
            }
            if !read_only && for_write && !conn.is_autocommit() {
                conn.execute_batch("ROLLBACK")?;
            }
            Ok(true)
        })
        .await;
        match checked {
            Ok(valid) => valid,
            Err(err) => {
                tracing::debug!(error = %err, "sqlite validity check failed");
                false
            }
        }
    }

    /// # Errors
    /// Returns `SqlWritebackError::SqliteError` if `BEGIN` fails.
    pub async fn begin(&self) -> Result<(), SqlWritebackError> {
        self.batch("BEGIN").await
    }

    /// # Errors
    /// Returns `SqlWritebackError::SqliteError` if `COMMIT` fails.
    pub async fn commit(&self) -> Result<(), SqlWritebackError> {
        self.batch("COMMIT").await
    }

    /// # Errors
    /// Returns `SqlWritebackError::SqliteError` if `ROLLBACK` fails.
    pub async fn rollback(&self) -> Result<(), SqlWritebackError> {
        self.batch("ROLLBACK").await
    }

    /// Execute one statement with positional parameters and return rows affected.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::SqliteError` if preparing or executing fails.
    pub async fn execute(&self, statement: &QueryAndParams) -> Result<usize, SqlWritebackError> {
        let sql = statement.query.clone();
        let params = Params::convert(&statement.params);
        run_blocking(Arc::clone(&self.conn), move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let affected = stmt.execute(params_from_iter(params.as_values().iter()))?;
            Ok(affected)
        })
        .await
    }

    /// # Errors
    /// Returns `SqlWritebackError::SqliteError` if preparing or stepping the query fails.
    pub async fn query(&self, statement: &QueryAndParams) -> Result<QueryResult, SqlWritebackError> {
        let sql = statement.query.clone();
        let params = Params::convert(&statement.params);
        run_blocking(Arc::clone(&self.conn), move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            build_query_result(&mut stmt, params.as_values())
        })
        .await
    }

    async fn batch(&self, sql: &'static str) -> Result<(), SqlWritebackError> {
        run_blocking(Arc::clone(&self.conn), move |conn| {
            conn.execute_batch(sql).map_err(SqlWritebackError::SqliteError)
        })
        .await
    }
}

impl fmt::Debug for SqliteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteSession").finish_non_exhaustive()
    }
}

pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, SqlWritebackError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlWritebackError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await?
}
