//! Shared fixtures for integration tests.

#![allow(dead_code)]

use datafusion::prelude::SessionContext;
use std::sync::Arc;
use term_rules::prelude::*;

/// A small grid schema: a populated bus table, a line table with one
/// dangling bus reference, and an empty table.
pub async fn grid_context() -> SessionContext {
    let ctx = SessionContext::new();
    for statement in [
        "CREATE SCHEMA grid",
        "CREATE TABLE grid.bus AS SELECT column1 AS bus_id, column2 AS v_nom, column3 AS scn_name, column4 AS country \
         FROM (VALUES (1, 110.0, 'eGon2035', 'DE'), (2, 380.0, 'eGon2035', 'DE'), (3, 220.0, 'eGon100RE', 'DE'), (4, NULL, 'eGon100RE', 'DK'))",
        "CREATE TABLE grid.line AS SELECT column1 AS line_id, column2 AS bus0, column3 AS s_nom, column4 AS length \
         FROM (VALUES (10, 1, 100.0, 12.0), (11, 2, 200.0, 25.0), (12, 9, 300.0, 37.0))",
        "CREATE TABLE grid.empty_table (id BIGINT, amount DOUBLE)",
    ] {
        ctx.sql(statement).await.unwrap().collect().await.unwrap();
    }
    ctx
}

pub async fn grid_source() -> Arc<dyn DataSource> {
    Arc::new(DataFusionSource::new(grid_context().await).with_name("grid"))
}

/// A custom check that always fails with a logic error.
#[derive(Debug, Default)]
pub struct FailingCheck;

#[async_trait::async_trait]
impl CustomCheck for FailingCheck {
    async fn evaluate(
        &self,
        _rule: &Rule,
        _source: &dyn DataSource,
        _ctx: &RunContext,
    ) -> RuleOutcome<RuleResult> {
        Err(RuleError::logic("lookup table missing column 'carrier'"))
    }
}

/// A custom check that sleeps far longer than any test timeout.
#[derive(Debug, Default)]
pub struct StuckCheck;

#[async_trait::async_trait]
impl CustomCheck for StuckCheck {
    async fn evaluate(
        &self,
        rule: &Rule,
        _source: &dyn DataSource,
        _ctx: &RunContext,
    ) -> RuleOutcome<RuleResult> {
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        Ok(rule.make_result(true, "finished"))
    }
}

/// A custom check that panics.
#[derive(Debug, Default)]
pub struct PanickingCheck;

#[async_trait::async_trait]
impl CustomCheck for PanickingCheck {
    async fn evaluate(
        &self,
        _rule: &Rule,
        _source: &dyn DataSource,
        _ctx: &RunContext,
    ) -> RuleOutcome<RuleResult> {
        panic!("attempt to divide by zero")
    }
}

/// The three-rule "adhoc" task: one empty table, one passing rule and one
/// rule that raises.
pub fn adhoc_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register(
            Registration::new("adhoc", "grid.empty_table")
                .with_rule_id("EMPTY_NOT_NULL")
                .with_params(Params::new().with("column", "id")),
            CheckFactory::row::<NotNullCheck>(),
        )
        .unwrap();
    registry
        .register(
            Registration::new("adhoc", "grid.bus")
                .with_rule_id("BUS_COUNT")
                .with_params(Params::new().with("expected_count", 4)),
            CheckFactory::row::<RowCountCheck>(),
        )
        .unwrap();
    registry
        .register(
            Registration::new("adhoc", "grid.line")
                .with_rule_id("LINE_CARRIER")
                .with_kind(RuleKind::Custom),
            CheckFactory::custom::<FailingCheck>(),
        )
        .unwrap();
    registry
}

pub fn run_context(out: &std::path::Path, run_id: &str) -> RunContext {
    RunContext::new(run_id).with_out_dir(out)
}
