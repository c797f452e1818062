//! Runs a small validation task against an in-memory grid and prints the
//! coverage summary.
//!
//! ```text
//! cargo run --example adhoc_run
//! RUST_LOG=term_rules=debug cargo run --example adhoc_run
//! ```

use datafusion::prelude::SessionContext;
use std::sync::Arc;
use term_rules::logging::setup::{init_logging, LoggingConfig};
use term_rules::logging::LogConfig;
use term_rules::prelude::*;

async fn grid() -> std::result::Result<SessionContext, Box<dyn std::error::Error>> {
    let ctx = SessionContext::new();
    for statement in [
        "CREATE SCHEMA grid",
        "CREATE TABLE grid.egon_etrago_bus AS SELECT column1 AS bus_id, column2 AS v_nom, column3 AS carrier \
         FROM (VALUES (1, 110.0, 'AC'), (2, 380.0, 'AC'), (3, NULL, 'CH4'), (4, 220.0, 'dsm'))",
        "CREATE TABLE grid.egon_etrago_load AS SELECT column1 AS load_id, column2 AS bus \
         FROM (VALUES (100, 1), (101, 2), (102, 7))",
        "CREATE TABLE grid.egon_mv_grid_district (id BIGINT)",
    ] {
        ctx.sql(statement).await?.collect().await?;
    }
    Ok(ctx)
}

fn registry() -> std::result::Result<Registry, RegistryError> {
    let mut registry = Registry::new();

    registry.register(
        Registration::new("adhoc", "grid.egon_mv_grid_district")
            .with_rule_id("MV_GRID_DISTRICT_COUNT")
            .with_params(Params::new().with("expected_count", 3854)),
        CheckFactory::row::<RowCountCheck>(),
    )?;

    registry.register_many(
        "adhoc",
        CheckFactory::row::<NotNullCheck>(),
        None,
        RuleKind::Formal,
        [
            ("grid.egon_etrago_bus", Params::new().with("column", "v_nom")),
            ("grid.egon_etrago_load", Params::new().with("column", "bus")),
        ],
    )?;

    registry.register(
        Registration::new("adhoc", "grid.egon_etrago_bus")
            .with_rule_id("BUS_CARRIER_VALUES")
            .with_params(
                Params::new()
                    .with("column", "carrier")
                    .with("expected_values", vec!["AC", "CH4", "dsm"]),
            ),
        CheckFactory::row::<ValueSetCheck>(),
    )?;

    registry.register(
        Registration::new("adhoc", "grid.egon_etrago_load")
            .with_rule_id("LOAD_BUS_FK")
            .with_params(
                Params::new()
                    .with("foreign_column", "bus")
                    .with("reference_table", "grid.egon_etrago_bus")
                    .with("reference_column", "bus_id"),
            ),
        CheckFactory::row::<ReferentialIntegrityCheck>(),
    )?;

    Ok(registry)
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingConfig::default())?;

    let out = tempfile::tempdir()?;
    let run = RunContext::timestamped().with_out_dir(out.path());
    let repository = ResultRepository::for_context(&run);
    let registry = Arc::new(registry()?);

    let config = EngineConfig::from_env()?.with_log_config(LogConfig::verbose());
    let runner = TaskRunner::new(Arc::clone(&registry), repository.clone(), config);
    let source = runner.resilient(Arc::new(DataFusionSource::new(grid().await?).with_name("grid")));

    let summary = runner.run_task("adhoc", source, &run).await?;
    println!(
        "{}: {} of {} rules passed in {:?}",
        summary.task, summary.passed, summary.total, summary.elapsed
    );
    for result in &summary.results {
        println!(
            "  [{}] {} on {}: {}",
            result.severity, result.rule_id, result.table, result.message
        );
    }

    let (_, coverage) = Aggregator::new(&repository)
        .with_registry(&registry)
        .with_total_tables(3)
        .run()
        .await?;
    println!(
        "success rate {}%, table coverage {}%, rule coverage {}%",
        coverage.validation_results.success_rate,
        coverage.table_coverage.percentage,
        coverage.rule_coverage.percentage
    );
    for cell in &coverage.cells {
        println!("  {:<32} {:<28} {}", cell.dataset, cell.rule_class, cell.status);
    }

    Ok(())
}
