//! # term-rules - Concurrent rule execution for relational datasets
//!
//! term-rules runs named, parameterized validation rules against database
//! tables, persists one result per rule to an append-only log, and
//! aggregates those logs into a coverage report.
//!
//! ## Overview
//!
//! Rules are grouped by *task*, which is typically one step of a data
//! pipeline. Running a task executes each of its rules as an isolated unit on
//! a bounded worker pool. A rule that fails, times out or panics still yields
//! a result, so a task with K rules always leaves K results on disk.
//! Transient database failures are retried with exponential backoff behind a
//! circuit breaker.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use datafusion::prelude::SessionContext;
//! use term_rules::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let ctx = SessionContext::new();
//! ctx.sql("CREATE TABLE bus AS SELECT column1 AS bus_id, column2 AS v_nom FROM (VALUES (1, 110.0), (2, 380.0))")
//!     .await?
//!     .collect()
//!     .await?;
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     Registration::new("grid", "bus")
//!         .with_rule_id("BUS_V_NOM_NOT_NULL")
//!         .with_params(Params::new().with("column", "v_nom")),
//!     CheckFactory::row::<NotNullCheck>(),
//! )?;
//!
//! let out = tempfile::tempdir()?;
//! let run = RunContext::new("quickstart").with_out_dir(out.path());
//! let repository = ResultRepository::for_context(&run);
//!
//! let runner = TaskRunner::new(Arc::new(registry), repository.clone(), EngineConfig::new());
//! let source = runner.resilient(Arc::new(DataFusionSource::new(ctx)));
//! let summary = runner.run_task("grid", source, &run).await?;
//! assert_eq!(summary.passed, 1);
//!
//! let (_, coverage) = Aggregator::new(&repository).run().await?;
//! assert_eq!(coverage.validation_results.success_rate, 100.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: rules, rule bodies, results and the run context
//! - [`registry`]: task → rules mapping built at startup
//! - [`checks`]: generic rule bodies (null, range, row count, value set,
//!   referential integrity, correlation, count comparison)
//! - [`sources`]: the [`DataSource`](sources::DataSource) trait, a
//!   DataFusion implementation and the resilient wrapper
//! - [`resilience`]: retry policy and circuit breaker
//! - [`runner`]: concurrent task execution
//! - [`repository`]: on-disk layout of a run
//! - [`aggregation`]: result collection and coverage
//!
//! ## Output layout
//!
//! ```text
//! <out_dir>/<run_id>/tasks/<task>/expected_rules.json
//! <out_dir>/<run_id>/tasks/<task>/<rule_id>/<table>.jsonl
//! <out_dir>/<run_id>/tasks/db_metadata.json
//! <out_dir>/<run_id>/final/{results.json, coverage.json}
//! ```

pub mod aggregation;
pub mod checks;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod registry;
pub mod repository;
pub mod resilience;
pub mod runner;
pub mod security;
pub mod sources;

#[cfg(test)]
pub(crate) mod test_helpers;
