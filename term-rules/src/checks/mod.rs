//! Generic rule bodies.
//!
//! Each check reads its settings from the rule's parameters, so one check
//! type can be registered against many tables with
//! [`Registry::register_many`](crate::registry::Registry::register_many).
//!
//! | Check | Variant | Parameters |
//! |-------|---------|------------|
//! | [`NotNullCheck`] | row | `column` |
//! | [`RangeCheck`] | row | `column`, `min_val`, `max_val`, `scenario_col`? |
//! | [`RowCountCheck`] | row | `expected_count` |
//! | [`ValueSetCheck`] | row | `column`, `expected_values` |
//! | [`ReferentialIntegrityCheck`] | row | `foreign_column`, `reference_table`, `reference_column` |
//! | [`CorrelationCheck`] | tabular | `x_column`, `y_column`, `min_correlation` |
//! | [`RowCountComparison`] | custom | `reference_table`, `reference_filter`? |
//!
//! Column names and table references are validated before they reach SQL.

mod correlation;
mod not_null;
mod range;
mod referential;
mod row_count;
mod value_set;

pub use correlation::CorrelationCheck;
pub use not_null::NotNullCheck;
pub use range::RangeCheck;
pub use referential::ReferentialIntegrityCheck;
pub use row_count::{RowCountCheck, RowCountComparison};
pub use value_set::ValueSetCheck;

use crate::core::{Rule, TableRef};
use crate::error::{RuleError, RuleOutcome};
use crate::security::SqlSecurity;

/// Reads a required column-name parameter and validates it as an identifier.
pub(crate) fn column_param<'a>(rule: &'a Rule, key: &str) -> RuleOutcome<&'a str> {
    let column = rule.params().require_str(key)?;
    SqlSecurity::identifier(column).map_err(|e| RuleError::logic(format!("parameter '{key}': {e}")))
}

/// Reads a required table-reference parameter.
pub(crate) fn table_param(rule: &Rule, key: &str) -> RuleOutcome<TableRef> {
    let table = rule.params().require_str(key)?;
    TableRef::parse(table).map_err(|e| RuleError::logic(format!("parameter '{key}': {e}")))
}
