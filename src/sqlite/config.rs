use std::path::PathBuf;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::SqlWritebackError;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// How to open sessions against a `SQLite` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteOptions {
    pub db_path: PathBuf,
    pub busy_timeout: Duration,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Open a raw connection for the given role. Blocking; call from a blocking context.
    ///
    /// Writable sessions switch the file to WAL so read-only sessions are not blocked by an
    /// open write transaction. Read-only sessions are marked `query_only`.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::SqliteError` if the file cannot be opened or configured.
    pub fn open_blocking(&self, read_only: bool) -> Result<Connection, SqlWritebackError> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(self.busy_timeout)?;
        if read_only {
            conn.execute_batch("PRAGMA query_only = ON;")?;
        } else {
            let _mode: String =
                conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        }
        Ok(conn)
    }
}
