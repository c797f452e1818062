use super::column_param;
use crate::core::{Params, Row, RowCheck, RowExt, Rule, RuleResult, RunContext};
use crate::error::{RuleError, RuleOutcome};

/// Fails when a column holds NULL or any value outside `expected_values`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueSetCheck;

impl ValueSetCheck {
    fn expected_values(rule: &Rule) -> RuleOutcome<Vec<String>> {
        let values = rule
            .params()
            .str_list("expected_values")
            .ok_or_else(|| RuleError::missing_param("expected_values"))?;
        if values.is_empty() {
            return Err(RuleError::logic("parameter 'expected_values' must not be empty"));
        }
        Ok(values)
    }
}

impl RowCheck for ValueSetCheck {
    fn build_query(&self, rule: &Rule, _ctx: &RunContext) -> RuleOutcome<String> {
        let column = column_param(rule, "column")?;
        Self::expected_values(rule)?;
        Ok(format!(
            "SELECT COUNT(*) AS total_rows, \
             SUM(CASE WHEN {column} IS NULL OR {column} NOT IN (:expected_values) THEN 1 ELSE 0 END) AS invalid_values \
             FROM {}",
            rule.table()
        ))
    }

    fn query_params(&self, rule: &Rule, _ctx: &RunContext) -> Params {
        match Self::expected_values(rule) {
            Ok(values) => Params::new().with("expected_values", values),
            Err(_) => Params::new(),
        }
    }

    fn postprocess(&self, rule: &Rule, row: &Row, _ctx: &RunContext) -> RuleOutcome<RuleResult> {
        let column = column_param(rule, "column")?;
        let expected = Self::expected_values(rule)?;
        let total = row.count("total_rows");
        let invalid = row.count("invalid_values");

        let message = if invalid == 0 {
            format!("All {total} values are in expected set {expected:?}")
        } else {
            format!("{invalid} of {total} values are not in expected set {expected:?}")
        };

        Ok(rule
            .make_result(invalid == 0, message)
            .with_observed(invalid)
            .with_expected(0i64)
            .with_column(column))
    }
}
