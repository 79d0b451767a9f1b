// SQLite backend
//
// - config: file options and raw connection setup
// - params: conversion between middleware values and rusqlite values
// - query: result extraction into stringified rows
// - session: the async session wrapper used by pooled connections

pub mod config;
pub mod params;
pub mod query;
pub mod session;

pub use config::SqliteOptions;
pub use query::build_query_result;
pub use session::SqliteSession;
