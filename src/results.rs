use std::fmt;

use crate::error::SqlWritebackError;
use crate::types::QueryAndParams;

/// Outcome tag of a batch write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteStatus {
    /// The batch was empty; no I/O happened.
    Empty,
    /// Every statement executed and the transaction committed.
    Success,
    /// The connection was locked; the transaction was rolled back.
    Disabled,
    /// A statement (or the session) failed; the transaction was rolled back.
    Error,
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            WriteStatus::Empty => "EMPTY",
            WriteStatus::Success => "SUCCESS",
            WriteStatus::Disabled => "DISABLED",
            WriteStatus::Error => "ERROR",
        };
        f.write_str(tag)
    }
}

/// The statement that made a batch fail, with its position in the submitted batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedStatement {
    pub position: usize,
    pub statement: QueryAndParams,
}

/// Result of `Connection::write`.
///
/// Batches are all-or-nothing. In the `Error` case `remaining` holds every statement of the
/// batch except the failing one, including statements that executed before it: their effects
/// were rolled back along with everything else, and nothing from the batch is committed.
/// Callers that want those statements applied must resubmit `remaining` themselves.
#[derive(Debug)]
pub enum WriteResult {
    Empty,
    Success {
        committed: Vec<QueryAndParams>,
    },
    Disabled {
        discarded: Vec<QueryAndParams>,
    },
    Error {
        /// `None` when the failure was not tied to one statement (unhealthy session,
        /// failed commit or rollback); `remaining` is then the whole batch.
        failed: Option<FailedStatement>,
        cause: SqlWritebackError,
        remaining: Vec<QueryAndParams>,
    },
}

impl WriteResult {
    #[must_use]
    pub fn status(&self) -> WriteStatus {
        match self {
            WriteResult::Empty => WriteStatus::Empty,
            WriteResult::Success { .. } => WriteStatus::Success,
            WriteResult::Disabled { .. } => WriteStatus::Disabled,
            WriteResult::Error { .. } => WriteStatus::Error,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, WriteResult::Success { .. })
    }

    /// Statements committed by this write (empty unless `Success`).
    #[must_use]
    pub fn committed(&self) -> &[QueryAndParams] {
        match self {
            WriteResult::Success { committed } => committed,
            _ => &[],
        }
    }

    #[must_use]
    pub fn failed(&self) -> Option<&FailedStatement> {
        match self {
            WriteResult::Error { failed, .. } => failed.as_ref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn cause(&self) -> Option<&SqlWritebackError> {
        match self {
            WriteResult::Error { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// Statements that were not committed and may be resubmitted.
    #[must_use]
    pub fn remaining(&self) -> &[QueryAndParams] {
        match self {
            WriteResult::Error { remaining, .. } => remaining,
            WriteResult::Disabled { discarded } => discarded,
            _ => &[],
        }
    }
}

/// Column labels and stringified rows of a read.
///
/// A failed read is reported here instead of being raised; check [`QueryResult::is_ok`]
/// (or use [`QueryResult::into_result`]) before consuming rows.
#[derive(Debug, Default)]
pub struct QueryResult {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
    error: Option<SqlWritebackError>,
    statement: Option<String>,
}

impl QueryResult {
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self {
            columns,
            rows,
            error: None,
            statement: None,
        }
    }

    /// A result carrying the error that stopped `statement` from running.
    #[must_use]
    pub fn from_error(error: SqlWritebackError, statement: impl Into<String>) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            error: Some(error),
            statement: Some(statement.into()),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    #[must_use]
    pub fn error(&self) -> Option<&SqlWritebackError> {
        self.error.as_ref()
    }

    /// Text of the statement that failed, when the read failed.
    #[must_use]
    pub fn statement(&self) -> Option<&str> {
        self.statement.as_deref()
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Cell at `row` under `column`; `None` for SQL NULL, a missing row, or an unknown column.
    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// Every cell of `column`, top to bottom. Empty for an unknown column.
    #[must_use]
    pub fn column(&self, column: &str) -> Vec<Option<&str>> {
        match self.column_index(column) {
            Some(idx) => self
                .rows
                .iter()
                .map(|row| row.get(idx).and_then(|cell| cell.as_deref()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Turn a captured error back into `Err`.
    ///
    /// # Errors
    /// Returns the error captured while the read executed.
    pub fn into_result(self) -> Result<Self, SqlWritebackError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryResult {
        QueryResult::new(
            vec!["id".into(), "name".into()],
            vec![
                vec![Some("1".into()), Some("alice".into())],
                vec![Some("2".into()), None],
            ],
        )
    }

    #[test]
    fn cells_are_addressed_by_column_label() {
        let qr = sample();
        assert!(qr.is_ok());
        assert_eq!(qr.row_count(), 2);
        assert_eq!(qr.get(0, "name"), Some("alice"));
        assert_eq!(qr.get(1, "name"), None);
        assert_eq!(qr.get(5, "id"), None);
        assert_eq!(qr.column("id"), vec![Some("1"), Some("2")]);
        assert!(qr.column("missing").is_empty());
    }

    #[test]
    fn captured_errors_surface_through_into_result() {
        let qr = QueryResult::from_error(
            SqlWritebackError::ExecutionError("no such table".into()),
            "SELECT * FROM nope",
        );
        assert!(!qr.is_ok());
        assert_eq!(qr.statement(), Some("SELECT * FROM nope"));
        assert!(qr.rows().is_empty());
        assert!(qr.into_result().is_err());
    }

    #[test]
    fn remaining_reports_uncommitted_statements() {
        let batch = vec![QueryAndParams::from("a"), QueryAndParams::from("c")];
        let result = WriteResult::Error {
            failed: Some(FailedStatement {
                position: 1,
                statement: QueryAndParams::from("b"),
            }),
            cause: SqlWritebackError::ExecutionError("boom".into()),
            remaining: batch.clone(),
        };
        assert_eq!(result.status(), WriteStatus::Error);
        assert_eq!(result.remaining(), batch.as_slice());
        assert_eq!(result.failed().map(|f| f.position), Some(1));
        assert!(result.committed().is_empty());
        assert_eq!(WriteStatus::Disabled.to_string(), "DISABLED");
    }
}
