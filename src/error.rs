use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlWritebackError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The session stayed invalid after one reopen attempt.
    #[error("Connection unhealthy: {0}")]
    ConnectionUnhealthy(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),
}

impl From<tokio::task::JoinError> for SqlWritebackError {
    fn from(err: tokio::task::JoinError) -> Self {
        SqlWritebackError::ExecutionError(format!("task join error: {err}"))
    }
}
