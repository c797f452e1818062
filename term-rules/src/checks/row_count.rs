use super::table_param;
use crate::core::{CustomCheck, Params, Row, RowCheck, RowExt, Rule, RuleResult, RunContext};
use crate::error::{RuleError, RuleOutcome};
use crate::security::SqlSecurity;
use crate::sources::DataSource;
use async_trait::async_trait;

/// Fails unless the table has exactly `expected_count` rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowCountCheck;

impl RowCountCheck {
    fn expected(rule: &Rule) -> RuleOutcome<i64> {
        rule.params()
            .i64("expected_count")
            .ok_or_else(|| RuleError::missing_param("expected_count"))
    }
}

impl RowCheck for RowCountCheck {
    fn build_query(&self, rule: &Rule, _ctx: &RunContext) -> RuleOutcome<String> {
        Self::expected(rule)?;
        Ok(format!("SELECT COUNT(*) AS actual_count FROM {}", rule.table()))
    }

    fn postprocess(&self, rule: &Rule, row: &Row, _ctx: &RunContext) -> RuleOutcome<RuleResult> {
        let expected = Self::expected(rule)?;
        let actual = row.count("actual_count");
        Ok(rule
            .make_result(
                actual == expected,
                format!("Expected {expected} rows, found {actual}"),
            )
            .with_observed(actual)
            .with_expected(expected))
    }
}

/// Compares the row count of the rule's table with a reference table.
///
/// `reference_filter` is an optional `WHERE` expression applied to the
/// reference table only, e.g. `gf = 4`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowCountComparison;

async fn count_rows(source: &dyn DataSource, query: &str) -> RuleOutcome<i64> {
    let row = source.fetch_one(query, &Params::new()).await?;
    Ok(row.count("n"))
}

#[async_trait]
impl CustomCheck for RowCountComparison {
    async fn evaluate(
        &self,
        rule: &Rule,
        source: &dyn DataSource,
        _ctx: &RunContext,
    ) -> RuleOutcome<RuleResult> {
        let reference = table_param(rule, "reference_table")?;
        let filter = rule.params().str("reference_filter");

        let mut reference_query = format!("SELECT COUNT(*) AS n FROM {reference}");
        if let Some(filter) = filter {
            SqlSecurity::validate_filter_expression(filter)
                .map_err(|e| RuleError::logic(format!("parameter 'reference_filter': {e}")))?;
            reference_query.push_str(&format!(" WHERE {filter}"));
        }

        let actual_query = format!("SELECT COUNT(*) AS n FROM {}", rule.table());
        let actual = count_rows(source, &actual_query).await?;
        let expected = count_rows(source, &reference_query).await?;

        Ok(rule
            .make_result(
                actual == expected,
                format!("{} has {actual} rows, {reference} has {expected}", rule.table()),
            )
            .with_observed(actual)
            .with_expected(expected))
    }
}
