//! Per-run execution context.

use super::Params;
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Default root directory for run output.
pub const DEFAULT_OUT_DIR: &str = "./validation_runs";

/// Environment variable overriding the output root.
pub const OUT_DIR_ENV: &str = "TERM_RULES_OUT_DIR";

/// Identifies a validation run and where its output lands.
///
/// The context is shared read-only by every rule of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    run_id: String,
    out_dir: PathBuf,
    scenario: Option<String>,
    extra: Params,
}

impl RunContext {
    /// Creates a context with the default output root.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            scenario: None,
            extra: Params::new(),
        }
    }

    /// Creates a context whose output root comes from `TERM_RULES_OUT_DIR`.
    pub fn from_env(run_id: impl Into<String>) -> Self {
        let ctx = Self::new(run_id);
        match std::env::var(OUT_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => ctx.with_out_dir(dir),
            _ => ctx,
        }
    }

    /// Creates a context with a timestamped run id such as `run_20251016T101500`.
    pub fn timestamped() -> Self {
        Self::from_env(format!("run_{}", Utc::now().format("%Y%m%dT%H%M%S")))
    }

    /// Sets the output root.
    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }

    /// Sets the scenario name rules may filter on.
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    /// Adds an extra run-level value.
    pub fn with_extra(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.extra.insert(key, value);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn scenario(&self) -> Option<&str> {
        self.scenario.as_deref()
    }

    pub fn extra(&self) -> &Params {
        &self.extra
    }

    /// Returns `<out_dir>/<run_id>`.
    pub fn run_dir(&self) -> PathBuf {
        self.out_dir.join(&self.run_id)
    }
}
