use super::column_param;
use crate::core::{Params, Row, RowCheck, RowExt, Rule, RuleResult, RunContext};
use crate::error::RuleOutcome;

/// Fails when values of a column fall outside `[min_val, max_val]`.
///
/// With a `scenario_col` parameter and a scenario on the run context, only
/// rows of that scenario are checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeCheck;

impl RangeCheck {
    fn bounds(rule: &Rule) -> RuleOutcome<(f64, f64)> {
        let params = rule.params();
        Ok((params.require_f64("min_val")?, params.require_f64("max_val")?))
    }
}

impl RowCheck for RangeCheck {
    fn build_query(&self, rule: &Rule, ctx: &RunContext) -> RuleOutcome<String> {
        let column = column_param(rule, "column")?;
        Self::bounds(rule)?;

        let mut query = format!(
            "SELECT COUNT(*) AS n_bad FROM {} WHERE ({column} < :min_val OR {column} > :max_val)",
            rule.table()
        );
        if ctx.scenario().is_some() && rule.params().contains("scenario_col") {
            let scenario_col = column_param(rule, "scenario_col")?;
            query.push_str(&format!(" AND {scenario_col} = :scenario"));
        }
        Ok(query)
    }

    fn query_params(&self, rule: &Rule, ctx: &RunContext) -> Params {
        let mut params = Params::new();
        if let Ok((min, max)) = Self::bounds(rule) {
            params.insert("min_val", min);
            params.insert("max_val", max);
        }
        if let Some(scenario) = ctx.scenario() {
            params.insert("scenario", scenario);
        }
        params
    }

    fn postprocess(&self, rule: &Rule, row: &Row, ctx: &RunContext) -> RuleOutcome<RuleResult> {
        let column = column_param(rule, "column")?;
        let (min, max) = Self::bounds(rule)?;
        let n_bad = row.count("n_bad");

        let mut message = format!("{n_bad} rows outside range [{min}, {max}]");
        if let (Some(scenario), true) = (ctx.scenario(), rule.params().contains("scenario_col")) {
            message.push_str(&format!(" for scenario {scenario}"));
        }

        Ok(rule
            .make_result(n_bad == 0, message)
            .with_observed(n_bad)
            .with_expected(0i64)
            .with_column(column))
    }
}
