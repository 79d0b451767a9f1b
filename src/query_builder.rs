use std::sync::LazyLock;

use regex::Regex;

use crate::error::SqlWritebackError;
use crate::translation::{Dialect, translate_dialect};
use crate::types::QueryAndParams;

static NON_PAREN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^()]").expect("valid regex"));

/// Builds INSERT/UPDATE/DELETE/CREATE TABLE text for one dialect.
///
/// Values are inlined as literals, not bound as parameters. A value is emitted unquoted only
/// when its parentheses alone read `()` (so `NOW()` is treated as a function call); everything
/// else is wrapped in single quotes. Embedded single quotes are not escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementBuilder {
    dialect: Dialect,
}

impl StatementBuilder {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Translate `value` and quote it unless it looks like a call expression.
    ///
    /// ```rust
    /// use sql_writeback::prelude::*;
    ///
    /// let b = StatementBuilder::new(Dialect::Embedded);
    /// assert_eq!(b.quote_value("abc"), "'abc'");
    /// assert_eq!(b.quote_value("NOW()"), "datetime('NOW', 'localtime')");
    /// ```
    #[must_use]
    pub fn quote_value(&self, value: &str) -> String {
        let translated = translate_dialect(value, self.dialect);
        if NON_PAREN.replace_all(value, "") == "()" {
            translated.into_owned()
        } else {
            format!("'{translated}'")
        }
    }

    /// `CREATE TABLE IF NOT EXISTS name (f1, f2, ...)` with each field translated.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ParameterError` when `fields` is empty.
    pub fn create_table<I, S>(&self, table: &str, fields: I) -> Result<QueryAndParams, SqlWritebackError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields: Vec<String> = fields
            .into_iter()
            .map(|f| translate_dialect(f.as_ref(), self.dialect).into_owned())
            .collect();
        if fields.is_empty() {
            return Err(SqlWritebackError::ParameterError(format!(
                "create table {table} requires at least one field"
            )));
        }
        Ok(QueryAndParams::new_without_params(format!(
            "CREATE TABLE IF NOT EXISTS {table} ({})",
            fields.join(", ")
        )))
    }

    /// `INSERT INTO table (c1, c2) VALUES (v1, v2)` in the iteration order of `values`.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ParameterError` when `values` is empty.
    pub fn insert<I, K, V>(&self, table: &str, values: I) -> Result<QueryAndParams, SqlWritebackError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut columns = Vec::new();
        let mut literals = Vec::new();
        for (column, value) in values {
            columns.push(column.as_ref().to_string());
            literals.push(self.quote_value(value.as_ref()));
        }
        if columns.is_empty() {
            return Err(SqlWritebackError::ParameterError(format!(
                "insert into {table} requires at least one value"
            )));
        }
        Ok(QueryAndParams::new_without_params(format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            literals.join(", ")
        )))
    }

    /// `UPDATE table SET c = v, ... WHERE k = v AND ...`.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ParameterError` when `values` or `conditions` is empty.
    pub fn update<I, K, V, C, CK, CV>(
        &self,
        table: &str,
        values: I,
        conditions: C,
    ) -> Result<QueryAndParams, SqlWritebackError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
        C: IntoIterator<Item = (CK, CV)>,
        CK: AsRef<str>,
        CV: AsRef<str>,
    {
        let assignments = self.pairs(values);
        if assignments.is_empty() {
            return Err(SqlWritebackError::ParameterError(format!(
                "update {table} requires at least one value"
            )));
        }
        let where_clause = self.where_clause("update", table, conditions)?;
        Ok(QueryAndParams::new_without_params(format!(
            "UPDATE {table} SET {} WHERE {where_clause}",
            assignments.join(", ")
        )))
    }

    /// `DELETE FROM table WHERE k = v AND ...`.
    ///
    /// # Errors
    /// Returns `SqlWritebackError::ParameterError` when `conditions` is empty.
    pub fn delete<C, CK, CV>(&self, table: &str, conditions: C) -> Result<QueryAndParams, SqlWritebackError>
    where
        C: IntoIterator<Item = (CK, CV)>,
        CK: AsRef<str>,
        CV: AsRef<str>,
    {
        let where_clause = self.where_clause("delete", table, conditions)?;
        Ok(QueryAndParams::new_without_params(format!(
            "DELETE FROM {table} WHERE {where_clause}"
        )))
    }

    fn pairs<I, K, V>(&self, pairs: I) -> Vec<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        pairs
            .into_iter()
            .map(|(column, value)| format!("{} = {}", column.as_ref(), self.quote_value(value.as_ref())))
            .collect()
    }

    fn where_clause<C, CK, CV>(
        &self,
        op: &str,
        table: &str,
        conditions: C,
    ) -> Result<String, SqlWritebackError>
    where
        C: IntoIterator<Item = (CK, CV)>,
        CK: AsRef<str>,
        CV: AsRef<str>,
    {
        let conditions = self.pairs(conditions);
        if conditions.is_empty() {
            return Err(SqlWritebackError::ParameterError(format!(
                "{op} on {table} requires at least one condition"
            )));
        }
        Ok(conditions.join(" AND "))
    }
}
