//! Rows and materialized result tables.

use super::params::{value_as_f64, value_as_i64};
use serde_json::Value;
use std::collections::BTreeSet;

/// A single result row keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// Typed access to row columns.
pub trait RowExt {
    /// Returns a column as a float, accepting numeric strings.
    fn get_f64(&self, column: &str) -> Option<f64>;

    /// Returns a column as an integer.
    fn get_i64(&self, column: &str) -> Option<i64>;

    /// Returns a column as a string slice.
    fn get_str(&self, column: &str) -> Option<&str>;

    /// Returns an integer column, treating NULL or absence as zero.
    fn count(&self, column: &str) -> i64 {
        self.get_i64(column).unwrap_or(0)
    }
}

impl RowExt for Row {
    fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(value_as_f64)
    }

    fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(value_as_i64)
    }

    fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }
}

/// A fully materialized query result.
///
/// Tabular checks receive the whole result set instead of a single row so
/// they can compute multi-row statistics in memory.
#[derive(Debug, Clone, Default)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    /// Creates a table from rows.
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Returns the rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the union of column names across all rows, sorted.
    ///
    /// Rows may omit NULL columns, so the first row alone is not enough.
    pub fn columns(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self.rows.iter().flat_map(|row| row.keys()).collect();
        names.into_iter().cloned().collect()
    }

    /// Returns a column as floats, `None` where the value is NULL or not numeric.
    pub fn numeric_column(&self, column: &str) -> Vec<Option<f64>> {
        self.rows.iter().map(|row| row.get_f64(column)).collect()
    }

    /// Returns pairs of two numeric columns for rows where both are present.
    pub fn numeric_pairs(&self, x: &str, y: &str) -> Vec<(f64, f64)> {
        self.rows
            .iter()
            .filter_map(|row| Some((row.get_f64(x)?, row.get_f64(y)?)))
            .collect()
    }
}

impl From<Vec<Row>> for Table {
    fn from(rows: Vec<Row>) -> Self {
        Table::new(rows)
    }
}
