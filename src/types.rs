use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::translation::Dialect;

/// Values bound to statement parameters or read back from a row.
///
/// The same enum is used for both backends so callers never branch on driver types:
/// ```rust
/// use sql_writeback::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    /// Render the value the way a query cell is reported: every non-NULL type becomes text.
    ///
    /// Timestamps use `%Y-%m-%d %H:%M:%S%.f`, booleans `true`/`false`, and blobs are decoded
    /// as lossy UTF-8.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            RowValues::Int(i) => Some(i.to_string()),
            RowValues::Float(f) => Some(f.to_string()),
            RowValues::Text(s) => Some(s.clone()),
            RowValues::Bool(b) => Some(b.to_string()),
            RowValues::Timestamp(dt) => Some(dt.format("%F %T%.f").to_string()),
            RowValues::Null => None,
            RowValues::JSON(v) => Some(v.to_string()),
            RowValues::Blob(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

/// The backend kinds a store can be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `PostgreSQL`, reached over the network with credentials.
    #[cfg(feature = "postgres")]
    Postgres,
    /// `SQLite`, a local database file.
    #[cfg(feature = "sqlite")]
    Sqlite,
}

impl DatabaseType {
    /// SQL dialect statements are translated into for this backend.
    #[must_use]
    pub fn dialect(self) -> Dialect {
        match self {
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => Dialect::Networked,
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => Dialect::Embedded,
        }
    }
}

/// A statement and its positional parameters bundled together.
///
/// This is the unit that is buffered, queued, written and read.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAndParams {
    /// The SQL text
    pub query: String,
    /// The parameters bound to the statement, in order
    pub params: Vec<RowValues>,
}

impl QueryAndParams {
    pub fn new(query: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }

    pub fn new_without_params(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Vec::new(),
        }
    }
}

impl From<&str> for QueryAndParams {
    fn from(query: &str) -> Self {
        QueryAndParams::new_without_params(query)
    }
}

impl From<String> for QueryAndParams {
    fn from(query: String) -> Self {
        QueryAndParams::new_without_params(query)
    }
}
