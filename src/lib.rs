//! Buffered, ordered SQL writes with pooled sessions.
//!
//! Writes go into an in-memory buffer and are committed in submission order by a periodic
//! flush, one transaction per flush. Reads run synchronously on a separate read-only pool.
//! `SQLite` (via `rusqlite`) and `PostgreSQL` (via `tokio-postgres`) sit behind the same API.

pub mod backend;
pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod pool;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod prelude;
pub mod query_builder;
pub mod results;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;
pub mod sync_queue;
pub mod translation;
pub mod types;
pub mod writer;

pub use backend::{Backend, Session};
pub use buffer::{PendingStatement, WriteBuffer};
pub use config::StoreConfig;
pub use error::SqlWritebackError;
pub use events::{EventSink, Severity, TracingEventSink};
pub use pool::{Connection, ConnectionPool, ConnectionState, PooledConnection};
pub use query_builder::StatementBuilder;
pub use results::{FailedStatement, QueryResult, WriteResult, WriteStatus};
pub use store::SqlStore;
pub use sync_queue::SyncWriteQueue;
pub use translation::{DIALECT_TOKENS, Dialect, translate_dialect};
pub use types::{DatabaseType, QueryAndParams, RowValues};
pub use writer::{FlushOutcome, SqlWriter, WriterOptions};
