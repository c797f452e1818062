//! Core data model of the rule engine.
//!
//! ## Overview
//!
//! - **[`Rule`]**: a named, parameterized check bound to one [`TableRef`]
//! - **[`RuleBody`]**: the closed set of check shapes ([`RowCheck`],
//!   [`TabularCheck`], [`CustomCheck`])
//! - **[`RuleResult`]**: the record one rule execution produces
//! - **[`ExpectedRule`]**: a manifest entry written before a task runs
//! - **[`RunContext`]**: run identity and output location
//!
//! ## Execution shapes
//!
//! ```text
//! Row      build_query -> fetch_one -> postprocess
//!          (guarded by an empty-table probe)
//! Tabular  build_query -> fetch_all -> evaluate_table
//!          (empty result set short-circuits)
//! Custom   evaluate(rule, source, ctx)
//! ```

mod context;
mod expected;
mod params;
mod result;
mod rule;
mod severity;
mod table;

pub use context::{RunContext, DEFAULT_OUT_DIR, OUT_DIR_ENV};
pub use expected::ExpectedRule;
pub use params::{value_as_f64, value_as_i64, Params};
pub use result::{ResultValue, RuleResult};
pub use rule::{CustomCheck, RowCheck, Rule, RuleBody, RuleKind, TableRef, TabularCheck};
pub use severity::Severity;
pub use table::{Row, RowExt, Table};
