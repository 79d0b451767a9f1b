use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SqlWritebackError;
use crate::types::DatabaseType;

fn default_write_pool_size() -> usize {
    1
}

fn default_read_pool_size() -> usize {
    2
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_log_write_errors() -> bool {
    true
}

fn default_name() -> String {
    "sql-writeback".to_string()
}

/// Settings for a [`crate::SqlStore`].
///
/// Only the fields of the selected backend are consulted: `file_path` for `sqlite`,
/// `host`/`port`/`database`/`username`/`password` for `postgres`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: DatabaseType,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default = "default_write_pool_size")]
    pub write_pool_size: usize,
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default)]
    pub log_sql: bool,
    #[serde(default = "default_log_write_errors")]
    pub log_write_errors: bool,
    /// Name used in fatal messages sent to the event sink.
    #[serde(default = "default_name")]
    pub name: String,
}

impl StoreConfig {
    fn with_backend(backend: DatabaseType) -> Self {
        Self {
            backend,
            host: None,
            port: None,
            database: None,
            username: None,
            password: None,
            file_path: None,
            write_pool_size: default_write_pool_size(),
            read_pool_size: default_read_pool_size(),
            flush_interval_ms: default_flush_interval_ms(),
            log_sql: false,
            log_write_errors: default_log_write_errors(),
            name: default_name(),
        }
    }

    /// Embedded backend stored at `path`.
    #[cfg(feature = "sqlite")]
    #[must_use]
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        let mut cfg = Self::with_backend(DatabaseType::Sqlite);
        cfg.file_path = Some(path.into());
        cfg
    }

    /// Networked backend with password authentication.
    #[cfg(feature = "postgres")]
    #[must_use]
    pub fn postgres(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let mut cfg = Self::with_backend(DatabaseType::Postgres);
        cfg.host = Some(host.into());
        cfg.port = Some(port);
        cfg.database = Some(database.into());
        cfg.username = Some(username.into());
        cfg.password = Some(password.into());
        cfg
    }

    /// Parse a JSON document and validate it.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ConfigError` if the JSON is malformed or fails validation.
    pub fn from_json_str(json: &str) -> Result<Self, SqlWritebackError> {
        let cfg: StoreConfig = serde_json::from_str(json)
            .map_err(|e| SqlWritebackError::ConfigError(format!("invalid store config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_write_pool_size(mut self, size: usize) -> Self {
        self.write_pool_size = size;
        self
    }

    #[must_use]
    pub fn with_read_pool_size(mut self, size: usize) -> Self {
        self.read_pool_size = size;
        self
    }

    #[must_use]
    pub fn with_sql_logging(mut self, enabled: bool) -> Self {
        self.log_sql = enabled;
        self
    }

    #[must_use]
    pub fn with_write_error_logging(mut self, enabled: bool) -> Self {
        self.log_write_errors = enabled;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Check that the selected backend has everything it needs.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ConfigError` naming the first missing or invalid field.
    pub fn validate(&self) -> Result<(), SqlWritebackError> {
        match self.backend {
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => {
                require(self.host.is_some(), "host is required")?;
                require(self.port.is_some(), "port is required")?;
                require(self.database.is_some(), "database is required")?;
                require(self.username.is_some(), "username is required")?;
                require(self.password.is_some(), "password is required")?;
            }
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => {
                require(self.file_path.is_some(), "file_path is required")?;
            }
        }
        require(self.write_pool_size > 0, "write_pool_size must be at least 1")?;
        require(self.read_pool_size > 0, "read_pool_size must be at least 1")?;
        require(self.flush_interval_ms > 0, "flush_interval_ms must be positive")?;
        Ok(())
    }
}

fn require(ok: bool, message: &str) -> Result<(), SqlWritebackError> {
    if ok {
        Ok(())
    } else {
        Err(SqlWritebackError::ConfigError(message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "sqlite")]
    #[test]
    fn json_fills_defaults() {
        let cfg = StoreConfig::from_json_str(r#"{"backend": "sqlite", "file_path": "data.db"}"#)
            .expect("valid config");
        assert_eq!(cfg.write_pool_size, 1);
        assert_eq!(cfg.read_pool_size, 2);
        assert_eq!(cfg.flush_interval(), Duration::from_secs(1));
        assert!(cfg.log_write_errors);
        assert!(!cfg.log_sql);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_needs_a_path() {
        let err = StoreConfig::from_json_str(r#"{"backend": "sqlite"}"#).unwrap_err();
        assert!(matches!(err, SqlWritebackError::ConfigError(msg) if msg.contains("file_path")));
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn postgres_needs_credentials() {
        let err = StoreConfig::from_json_str(
            r#"{"backend": "postgres", "host": "localhost", "port": 5432, "database": "app"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SqlWritebackError::ConfigError(msg) if msg.contains("username")));

        let cfg = StoreConfig::postgres("localhost", 5432, "app", "me", "secret");
        assert!(cfg.validate().is_ok());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn zero_sizes_are_rejected() {
        let cfg = StoreConfig::sqlite("x.db").with_write_pool_size(0);
        assert!(cfg.validate().is_err());
        let cfg = StoreConfig::sqlite("x.db").with_flush_interval(Duration::ZERO);
        assert!(cfg.validate().is_err());
    }
}
