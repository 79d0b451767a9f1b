// PostgreSQL backend
//
// - config: connection parameters
// - params: `ToSql` for middleware values
// - query: typed cell extraction and stringified results
// - session: the async session wrapper used by pooled connections

pub mod config;
pub mod params;
pub mod query;
pub mod session;

pub use config::PostgresOptions;
pub use query::build_query_result;
pub use session::PostgresSession;
