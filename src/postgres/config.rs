use std::fmt;

use tokio_postgres::Config as PgConfig;

/// Connection parameters for the networked backend.
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresOptions {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl PostgresOptions {
    #[must_use]
    pub fn to_pg_config(&self) -> PgConfig {
        let mut cfg = PgConfig::new();
        cfg.host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.username)
            .password(&self.password)
            .application_name("sql-writeback");
        cfg
    }
}

// Keep the password out of logs.
impl fmt::Debug for PostgresOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
