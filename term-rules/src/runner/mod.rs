//! Concurrent execution of a task's rules.
//!
//! A task run resolves its rules, records the manifest of what it intends to
//! run, then executes every rule as an isolated unit on a bounded worker
//! pool. Each unit yields exactly one [`RuleResult`]: success, data
//! violation, or a failing result describing the error. Results are
//! appended to their rule log in completion order, as soon as they arrive.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use datafusion::prelude::SessionContext;
//! use term_rules::config::EngineConfig;
//! use term_rules::core::RunContext;
//! use term_rules::registry::Registry;
//! use term_rules::repository::ResultRepository;
//! use term_rules::runner::TaskRunner;
//! use term_rules::sources::DataFusionSource;
//!
//! # async fn example(registry: Registry) -> term_rules::error::Result<()> {
//! let ctx = RunContext::from_env("run_2025_10_16");
//! let runner = TaskRunner::new(
//!     Arc::new(registry),
//!     ResultRepository::for_context(&ctx),
//!     EngineConfig::from_env()?,
//! );
//!
//! let source = runner.resilient(Arc::new(DataFusionSource::new(SessionContext::new())));
//! let summary = runner.run_task("grid", source, &ctx).await?;
//! println!("{} of {} rules passed", summary.passed, summary.total);
//! # Ok(())
//! # }
//! ```

mod tables;
mod unit;

pub use tables::probe_total_tables;

use crate::config::EngineConfig;
use crate::core::{ExpectedRule, Rule, RuleResult, RunContext, Severity};
use crate::error::{RegistryError, Result, RulesError};
use crate::registry::Registry;
use crate::repository::{ResultRepository, RunMetadata};
use crate::sources::{DataSource, ResilientSource};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

/// Outcome of one task run.
#[derive(Debug, Clone)]
pub struct TaskSummary {
    pub task: String,
    pub run_id: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub elapsed: Duration,
    /// Results sorted by `(rule_id, table)`
    pub results: Vec<RuleResult>,
}

impl TaskSummary {
    fn new(task: &str, run_id: &str, mut results: Vec<RuleResult>, elapsed: Duration) -> Self {
        results.sort_by(|a, b| (&a.rule_id, &a.table).cmp(&(&b.rule_id, &b.table)));
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            task: task.to_string(),
            run_id: run_id.to_string(),
            total: results.len(),
            passed,
            failed: results.len() - passed,
            elapsed,
            results,
        }
    }

    /// Average wall time per rule, zero for an empty task.
    pub fn avg_time_per_rule(&self) -> Duration {
        match u32::try_from(self.total) {
            Ok(n) if n > 0 => self.elapsed / n,
            _ => Duration::ZERO,
        }
    }

    /// Number of results with ERROR severity.
    pub fn errors(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.severity == Severity::Error)
            .count()
    }

    /// Returns true if every rule passed.
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Runs tasks against a data source and persists their results.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    registry: Arc<Registry>,
    repository: ResultRepository,
    config: EngineConfig,
}

impl TaskRunner {
    pub fn new(
        registry: Arc<Registry>,
        repository: ResultRepository,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            repository,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn repository(&self) -> &ResultRepository {
        &self.repository
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Wraps a source with the configured retry policy and circuit breakers.
    pub fn resilient(&self, source: Arc<dyn DataSource>) -> Arc<dyn DataSource> {
        Arc::new(
            ResilientSource::new(source)
                .with_retry_policy(self.config.retry_policy().clone())
                .with_breaker_config(self.config.breaker_config()),
        )
    }

    /// Runs every rule registered for `task`.
    ///
    /// Fails with [`RulesError::UnknownTask`] when nothing is registered.
    #[instrument(skip(self, source, ctx), fields(run_id = %ctx.run_id()))]
    pub async fn run_task(
        &self,
        task: &str,
        source: Arc<dyn DataSource>,
        ctx: &RunContext,
    ) -> Result<TaskSummary> {
        let rules = self.registry.rules_for(task);
        if rules.is_empty() {
            error!(task, "No rules registered for task");
            return Err(RulesError::UnknownTask(task.to_string()));
        }
        self.run_rules(task, rules, source, ctx).await
    }

    /// Runs an explicit list of rules under `task`.
    #[instrument(
        skip(self, rules, source, ctx),
        fields(run_id = %ctx.run_id(), rules = rules.len())
    )]
    pub async fn run_rules(
        &self,
        task: &str,
        rules: Vec<Rule>,
        source: Arc<dyn DataSource>,
        ctx: &RunContext,
    ) -> Result<TaskSummary> {
        let started = Instant::now();
        let total = rules.len();
        ensure_distinct(task, &rules)?;

        let expected: Vec<ExpectedRule> = rules.iter().map(ExpectedRule::from).collect();
        self.repository.write_manifest(task, &expected).await?;

        info!(
            task,
            total_rules = total,
            max_workers = self.config.max_workers(),
            run_id = %ctx.run_id(),
            "Starting rule execution"
        );

        let permits = Arc::new(Semaphore::new(self.config.max_workers()));
        let shared_ctx = Arc::new(ctx.clone());
        let mut units = JoinSet::new();
        let mut outstanding = HashMap::with_capacity(total);

        for (index, rule) in rules.into_iter().enumerate() {
            let rule = Arc::new(rule);
            outstanding.insert(index, Arc::clone(&rule));
            let work = unit::run_unit(
                rule,
                Arc::clone(&source),
                Arc::clone(&shared_ctx),
                Arc::clone(&permits),
                self.config.rule_timeout(),
            );
            units.spawn(async move { (index, work.await) });
        }

        let mut results = Vec::with_capacity(total);
        let drained = {
            let drain = self.drain(&mut units, &mut outstanding, &mut results);
            match self.config.task_timeout() {
                Some(limit) => tokio::time::timeout(limit, drain).await.ok(),
                None => Some(drain.await),
            }
        };

        match drained {
            Some(outcome) => outcome?,
            None => {
                units.abort_all();
                let timeout = self.config.task_timeout().unwrap_or_default();
                error!(
                    task,
                    completed = results.len(),
                    total,
                    timeout_secs = timeout.as_secs_f64(),
                    "Task timed out"
                );
                return Err(RulesError::TaskTimeout {
                    task: task.to_string(),
                    timeout,
                    completed: results.len(),
                    total,
                });
            }
        }

        // Units whose worker died without reporting still owe a result.
        let mut orphaned: Vec<_> = outstanding.into_iter().collect();
        orphaned.sort_by_key(|(index, _)| *index);
        for (_, rule) in orphaned {
            let result = rule.make_error_result("Unexpected error: rule worker terminated");
            self.repository.append_result(&result).await?;
            results.push(result);
        }

        let summary = TaskSummary::new(task, ctx.run_id(), results, started.elapsed());
        info!(
            task,
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            errors = summary.errors(),
            total_time_secs = summary.elapsed.as_secs_f64(),
            avg_time_secs = summary.avg_time_per_rule().as_secs_f64(),
            "Rule execution completed"
        );
        Ok(summary)
    }

    /// Collects unit results in completion order, persisting each one.
    async fn drain(
        &self,
        units: &mut JoinSet<(usize, RuleResult)>,
        outstanding: &mut HashMap<usize, Arc<Rule>>,
        results: &mut Vec<RuleResult>,
    ) -> Result<()> {
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok((index, result)) => {
                    outstanding.remove(&index);
                    let path = self.repository.append_result(&result).await?;
                    let logging = self.config.log_config();
                    if logging.log_rule_details {
                        info!(
                            rule.id = %result.rule_id,
                            rule.table = %result.table,
                            success = result.success,
                            severity = %result.severity,
                            message = %logging.field(&result.message),
                            path = %path.display(),
                            "Persisted rule result"
                        );
                    }
                    results.push(result);
                }
                Err(e) => warn!(error = %e, "Rule worker terminated without a result"),
            }
        }
        Ok(())
    }

    /// Counts the tables in the database and caches the count for coverage.
    ///
    /// The probe is best-effort: an unreachable database records zero.
    #[instrument(skip(self, source))]
    pub async fn record_table_count(&self, source: &dyn DataSource) -> Result<u64> {
        let total_tables = probe_total_tables(source, self.config.table_count_query()).await;
        self.repository
            .write_metadata(&RunMetadata { total_tables })
            .await?;
        info!(total_tables, "Recorded database table count");
        Ok(total_tables)
    }
}

/// Rejects two rules that would write to the same log.
fn ensure_distinct(task: &str, rules: &[Rule]) -> Result<()> {
    let mut seen = HashSet::with_capacity(rules.len());
    for rule in rules {
        if !seen.insert((rule.rule_id(), rule.table().qualified())) {
            return Err(RegistryError::Duplicate {
                task: task.to_string(),
                rule_id: rule.rule_id().to_string(),
                table: rule.table().qualified(),
            }
            .into());
        }
    }
    Ok(())
}
