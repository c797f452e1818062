//! One rule, one isolated unit of work.

use crate::core::{Rule, RuleResult, RunContext, Severity};
use crate::error::{DataErrorKind, RuleError, RuleOutcome};
use crate::sources::DataSource;
use chrono::Utc;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Aborts the wrapped task when dropped, so cancelling a unit also
/// cancels the rule it is running.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs one rule under a worker permit and always yields exactly one result.
pub(crate) async fn run_unit(
    rule: Arc<Rule>,
    source: Arc<dyn DataSource>,
    ctx: Arc<RunContext>,
    permits: Arc<Semaphore>,
    rule_timeout: Option<Duration>,
) -> RuleResult {
    let Ok(_permit) = permits.acquire_owned().await else {
        return rule.make_error_result("Unexpected error: worker pool closed");
    };

    let started = Instant::now();
    let executed_at = Utc::now();

    let mut task = AbortOnDrop(tokio::spawn({
        let rule = Arc::clone(&rule);
        async move { execute(&rule, source.as_ref(), &ctx, rule_timeout).await }
    }));

    let result = match (&mut task.0).await {
        Ok(Ok(result)) => {
            debug!(
                rule.id = %rule.rule_id(),
                rule.table = %rule.table(),
                success = result.success,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Rule completed"
            );
            result
        }
        Ok(Err(e)) => error_result(&rule, &e),
        Err(e) => join_error_result(&rule, e),
    };

    stamp(&rule, result).with_timing(started.elapsed(), executed_at)
}

async fn execute(
    rule: &Rule,
    source: &dyn DataSource,
    ctx: &RunContext,
    rule_timeout: Option<Duration>,
) -> RuleOutcome<RuleResult> {
    match rule_timeout {
        Some(limit) => tokio::time::timeout(limit, rule.execute(source, ctx))
            .await
            .unwrap_or(Err(RuleError::Timeout(limit))),
        None => rule.execute(source, ctx).await,
    }
}

/// Forces the rule's identity onto its result and fills in the class.
fn stamp(rule: &Rule, mut result: RuleResult) -> RuleResult {
    result.rule_id = rule.rule_id().to_string();
    result.task = rule.task().to_string();
    result.table = rule.table().qualified();
    result.schema = rule.table().schema().map(str::to_string);
    result.kind = rule.kind();
    if result.rule_class.is_empty() {
        result.rule_class = rule.rule_class().to_string();
    }
    result
}

/// Converts a rule failure into its failing result.
pub(crate) fn error_result(rule: &Rule, err: &RuleError) -> RuleResult {
    match err {
        RuleError::Data(e) => {
            // A query error is a defect in the rule itself
            let severity = if e.is_connection() || e.kind() == DataErrorKind::Query {
                Severity::Error
            } else {
                Severity::Warning
            };
            warn!(
                rule.id = %rule.rule_id(),
                rule.table = %rule.table(),
                error.kind = %e.kind(),
                error = %e,
                "Rule failed with database error"
            );
            rule.make_result(false, format!("Database error: {e}"))
                .with_severity(severity)
        }
        RuleError::Logic(_) | RuleError::Timeout(_) => {
            error!(
                rule.id = %rule.rule_id(),
                rule.table = %rule.table(),
                error = %err,
                "Rule execution error"
            );
            rule.make_error_result(format!("Rule execution error: {err}"))
        }
    }
}

fn join_error_result(rule: &Rule, err: JoinError) -> RuleResult {
    let detail = if err.is_panic() {
        panic_message(err.into_panic())
    } else {
        "rule task was cancelled".to_string()
    };
    error!(
        rule.id = %rule.rule_id(),
        rule.table = %rule.table(),
        error = %detail,
        "Rule panicked"
    );
    rule.make_error_result(format!("Unexpected error: {detail}"))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "rule panicked".to_string()
    }
}
