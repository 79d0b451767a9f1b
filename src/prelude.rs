//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::backend::Backend;
pub use crate::config::StoreConfig;
pub use crate::error::SqlWritebackError;
pub use crate::events::{EventSink, Severity, TracingEventSink};
pub use crate::pool::{Connection, ConnectionPool, ConnectionState, PooledConnection};
pub use crate::query_builder::StatementBuilder;
pub use crate::results::{FailedStatement, QueryResult, WriteResult, WriteStatus};
pub use crate::store::SqlStore;
pub use crate::sync_queue::SyncWriteQueue;
pub use crate::translation::{Dialect, translate_dialect};
pub use crate::types::{DatabaseType, QueryAndParams, RowValues};
pub use crate::writer::{FlushOutcome, SqlWriter, WriterOptions};

#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresOptions;
#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteOptions;
