use rusqlite::types::Value;

use crate::types::RowValues;

/// Convert a single `RowValues` to a rusqlite `Value`.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Owned `SQLite` parameters, bound positionally as `?1`, `?2`, ...
pub struct Params(pub Vec<Value>);

impl Params {
    #[must_use]
    pub fn convert(params: &[RowValues]) -> Self {
        Params(params.iter().map(row_value_to_sqlite_value).collect())
    }

    #[must_use]
    pub fn as_values(&self) -> &[Value] {
        &self.0
    }
}

/// Turn a rusqlite cell into text. `NULL` stays `None`.
#[must_use]
pub fn sqlite_value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s),
        Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans_bind_as_integers() {
        let params = Params::convert(&[RowValues::Bool(true), RowValues::Null]);
        assert_eq!(params.as_values(), &[Value::Integer(1), Value::Null]);
    }

    #[test]
    fn cells_stringify() {
        assert_eq!(sqlite_value_to_text(Value::Integer(3)).as_deref(), Some("3"));
        assert_eq!(sqlite_value_to_text(Value::Real(1.5)).as_deref(), Some("1.5"));
        assert_eq!(sqlite_value_to_text(Value::Null), None);
    }
}
