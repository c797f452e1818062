use super::{column_param, table_param};
use crate::core::{Row, RowCheck, RowExt, Rule, RuleResult, RunContext};
use crate::error::RuleOutcome;

/// Counts non-null foreign keys without a matching row in a reference table.
///
/// Useful for tables whose relationships are not enforced by constraints.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferentialIntegrityCheck;

impl RowCheck for ReferentialIntegrityCheck {
    fn build_query(&self, rule: &Rule, _ctx: &RunContext) -> RuleOutcome<String> {
        let foreign = column_param(rule, "foreign_column")?;
        let reference = table_param(rule, "reference_table")?;
        let reference_column = column_param(rule, "reference_column")?;

        Ok(format!(
            "SELECT \
             SUM(CASE WHEN child.{foreign} IS NOT NULL THEN 1 ELSE 0 END) AS total_references, \
             SUM(CASE WHEN child.{foreign} IS NOT NULL AND parent.{reference_column} IS NULL THEN 1 ELSE 0 END) AS orphaned_references \
             FROM {} AS child \
             LEFT JOIN {reference} AS parent ON child.{foreign} = parent.{reference_column}",
            rule.table()
        ))
    }

    fn postprocess(&self, rule: &Rule, row: &Row, _ctx: &RunContext) -> RuleOutcome<RuleResult> {
        let foreign = column_param(rule, "foreign_column")?;
        let reference = table_param(rule, "reference_table")?;
        let reference_column = column_param(rule, "reference_column")?;
        let total = row.count("total_references");
        let orphaned = row.count("orphaned_references");

        let message = if orphaned == 0 {
            format!("All {total} references in {foreign} match {reference}.{reference_column}")
        } else {
            format!(
                "{orphaned} orphaned references in {foreign} (out of {total} non-null references to {reference}.{reference_column})"
            )
        };

        Ok(rule
            .make_result(orphaned == 0, message)
            .with_observed(orphaned)
            .with_expected(0i64)
            .with_column(foreign))
    }
}
