//! Backend selection.
//!
//! The backend is chosen once, when a store is built, and every pooled connection opens its
//! sessions through the same [`Backend`] value. Per-call code only ever talks to [`Session`].

use crate::config::StoreConfig;
use crate::error::SqlWritebackError;
use crate::results::QueryResult;
use crate::translation::Dialect;
use crate::types::{DatabaseType, QueryAndParams};

#[cfg(feature = "postgres")]
use crate::postgres::{PostgresOptions, PostgresSession};
#[cfg(feature = "sqlite")]
use crate::sqlite::{SqliteOptions, SqliteSession};

/// How to reach the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    #[cfg(feature = "postgres")]
    Postgres(PostgresOptions),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteOptions),
}

impl Backend {
    /// Build the backend named by `config`.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ConfigError` if the config is incomplete for its backend.
    pub fn from_config(config: &StoreConfig) -> Result<Self, SqlWritebackError> {
        config.validate()?;
        let missing = |field: &str| SqlWritebackError::ConfigError(format!("{field} is required"));
        match config.backend {
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => Ok(Backend::Postgres(PostgresOptions {
                host: config.host.clone().ok_or_else(|| missing("host"))?,
                port: config.port.ok_or_else(|| missing("port"))?,
                database: config.database.clone().ok_or_else(|| missing("database"))?,
                username: config.username.clone().ok_or_else(|| missing("username"))?,
                password: config.password.clone().ok_or_else(|| missing("password"))?,
            })),
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => Ok(Backend::Sqlite(SqliteOptions::new(
                config.file_path.clone().ok_or_else(|| missing("file_path"))?,
            ))),
        }
    }

    #[must_use]
    pub fn database_type(&self) -> DatabaseType {
        match self {
            #[cfg(feature = "postgres")]
            Backend::Postgres(_) => DatabaseType::Postgres,
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(_) => DatabaseType::Sqlite,
        }
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.database_type().dialect()
    }

    /// Open a fresh session for the given role.
    ///
    /// # Errors
    /// Propagates the driver error when the database cannot be reached or configured.
    pub async fn open(&self, read_only: bool) -> Result<Session, SqlWritebackError> {
        match self {
            #[cfg(feature = "postgres")]
            Backend::Postgres(opts) => Ok(Session::Postgres(
                PostgresSession::open(opts, read_only).await?,
            )),
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(opts) => Ok(Session::Sqlite(SqliteSession::open(opts, read_only).await?)),
        }
    }
}

/// An open physical session of either backend.
#[derive(Debug)]
pub enum Session {
    #[cfg(feature = "postgres")]
    Postgres(PostgresSession),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteSession),
}

impl Session {
    pub async fn is_valid(&self, read_only: bool, for_write: bool) -> bool {
        match self {
            #[cfg(feature = "postgres")]
            Session::Postgres(s) => s.is_valid(read_only, for_write).await,
            #[cfg(feature = "sqlite")]
            Session::Sqlite(s) => s.is_valid(read_only, for_write).await,
        }
    }

    /// # Errors
    /// Propagates the driver error.
    pub async fn begin(&self) -> Result<(), SqlWritebackError> {
        match self {
            #[cfg(feature = "postgres")]
            Session::Postgres(s) => s.begin().await,
            #[cfg(feature = "sqlite")]
            Session::Sqlite(s) => s.begin().await,
        }
    }

    /// # Errors
    /// Propagates the driver error.
    pub async fn commit(&self) -> Result<(), SqlWritebackError> {
        match self {
            #[cfg(feature = "postgres")]
            Session::Postgres(s) => s.commit().await,
            #[cfg(feature = "sqlite")]
            Session::Sqlite(s) => s.commit().await,
        }
    }

    /// # Errors
    /// Propagates the driver error.
    pub async fn rollback(&self) -> Result<(), SqlWritebackError> {
        match self {
            #[cfg(feature = "postgres")]
            Session::Postgres(s) => s.rollback().await,
            #[cfg(feature = "sqlite")]
            Session::Sqlite(s) => s.rollback().await,
        }
    }

    /// # Errors
    /// Propagates the driver error.
    pub async fn execute(&self, statement: &QueryAndParams) -> Result<usize, SqlWritebackError> {
        match self {
            #[cfg(feature = "postgres")]
            Session::Postgres(s) => s.execute(statement).await,
            #[cfg(feature = "sqlite")]
            Session::Sqlite(s) => s.execute(statement).await,
        }
    }

    /// # Errors
    /// Propagates the driver error.
    pub async fn query(&self, statement: &QueryAndParams) -> Result<QueryResult, SqlWritebackError> {
        match self {
            #[cfg(feature = "postgres")]
            Session::Postgres(s) => s.query(statement).await,
            #[cfg(feature = "sqlite")]
            Session::Sqlite(s) => s.query(statement).await,
        }
    }
}
