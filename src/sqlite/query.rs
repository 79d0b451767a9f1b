use rusqlite::types::Value;
use rusqlite::{Statement, params_from_iter};

use crate::error::SqlWritebackError;
use crate::results::QueryResult;

use super::params::sqlite_value_to_text;

/// Run a prepared `SQLite` statement and collect every cell as text.
///
/// Column labels come from the statement, so aliases (`AS x`) are reported as written.
///
/// # Errors
/// Returns `SqlWritebackError::SqliteError` if binding, stepping or reading a cell fails.
pub fn build_query_result(
    stmt: &mut Statement<'_>,
    params: &[Value],
) -> Result<QueryResult, SqlWritebackError> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();

    let mut rows_iter = stmt.query(params_from_iter(params.iter()))?;
    let mut rows = Vec::new();
    while let Some(row) = rows_iter.next()? {
        let mut cells = Vec::with_capacity(col_count);
        for idx in 0..col_count {
            let value: Value = row.get(idx)?;
            cells.push(sqlite_value_to_text(value));
        }
        rows.push(cells);
    }

    Ok(QueryResult::new(column_names, rows))
}
