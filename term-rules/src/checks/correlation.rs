use super::column_param;
use crate::core::{Rule, RuleResult, RunContext, Table, TabularCheck};
use crate::error::RuleOutcome;

/// Requires the Pearson correlation of two columns to reach `min_correlation`.
///
/// Rows where either column is NULL are ignored. Fewer than two complete
/// rows, or a constant column, fail the rule since no correlation exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationCheck;

impl TabularCheck for CorrelationCheck {
    fn build_query(&self, rule: &Rule, _ctx: &RunContext) -> RuleOutcome<String> {
        let x = column_param(rule, "x_column")?;
        let y = column_param(rule, "y_column")?;
        Ok(format!("SELECT {x}, {y} FROM {}", rule.table()))
    }

    fn evaluate_table(
        &self,
        rule: &Rule,
        table: &Table,
        _ctx: &RunContext,
    ) -> RuleOutcome<RuleResult> {
        let x = column_param(rule, "x_column")?;
        let y = column_param(rule, "y_column")?;
        let min = rule.params().require_f64("min_correlation")?;

        let pairs = table.numeric_pairs(x, y);
        let Some(r) = pearson(&pairs) else {
            return Ok(rule
                .make_result(
                    false,
                    format!(
                        "correlation of {x} and {y} is undefined over {} complete rows",
                        pairs.len()
                    ),
                )
                .with_expected(min));
        };

        Ok(rule
            .make_result(
                r >= min,
                format!("correlation of {x} and {y} is {r:.4}, minimum {min}"),
            )
            .with_observed(r)
            .with_expected(min))
    }
}

/// Pearson correlation coefficient, `None` when undefined.
fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        let (dx, dy) = (x - mean_x, y - mean_y);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }
    Some(cov / denominator)
}
