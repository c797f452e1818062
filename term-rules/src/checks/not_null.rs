use super::column_param;
use crate::core::{Row, RowCheck, RowExt, Rule, RuleResult, RunContext};
use crate::error::RuleOutcome;

/// Fails when a column holds NULL or NaN values.
///
/// `x <> x` is only true for NaN, which catches float NaNs on Postgres.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotNullCheck;

impl RowCheck for NotNullCheck {
    fn build_query(&self, rule: &Rule, _ctx: &RunContext) -> RuleOutcome<String> {
        let column = column_param(rule, "column")?;
        Ok(format!(
            "SELECT COUNT(*) AS n_bad FROM {} WHERE ({column} IS NULL OR {column} <> {column})",
            rule.table()
        ))
    }

    fn postprocess(&self, rule: &Rule, row: &Row, _ctx: &RunContext) -> RuleOutcome<RuleResult> {
        let column = column_param(rule, "column")?;
        let n_bad = row.count("n_bad");
        Ok(rule
            .make_result(n_bad == 0, format!("{n_bad} offending rows (NULL or NaN)"))
            .with_observed(n_bad)
            .with_expected(0i64)
            .with_column(column))
    }
}
