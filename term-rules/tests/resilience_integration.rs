//! Integration tests for retries and circuit breaking around a data source.

mod common;

use common::*;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use term_rules::error::DataResult;
use term_rules::prelude::*;
use term_rules::resilience::CircuitState;

/// Fails with a connection error while `down` is set or for the first
/// `fail_first` calls, otherwise answers from `inner`.
#[derive(Debug)]
struct FlakySource {
    inner: Option<Arc<dyn DataSource>>,
    fail_first: u32,
    down: AtomicBool,
    calls: AtomicU32,
}

impl FlakySource {
    fn new(inner: Option<Arc<dyn DataSource>>, fail_first: u32) -> Self {
        Self {
            inner,
            fail_first,
            down: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        }
    }

    fn down(self) -> Self {
        self.down.store(true, Ordering::SeqCst);
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> DataResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) || call < self.fail_first {
            return Err(DataError::connection("server closed the connection unexpectedly"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DataSource for FlakySource {
    async fn fetch_one(&self, query: &str, params: &Params) -> DataResult<Row> {
        self.check()?;
        match &self.inner {
            Some(inner) => inner.fetch_one(query, params).await,
            None => Ok(Row::new()),
        }
    }

    async fn fetch_all(&self, query: &str, params: &Params) -> DataResult<Vec<Row>> {
        self.check()?;
        match &self.inner {
            Some(inner) => inner.fetch_all(query, params).await,
            None => Ok(Vec::new()),
        }
    }

    fn description(&self) -> String {
        "flaky".to_string()
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new()
        .with_max_attempts(max_attempts)
        .with_base_delay(Duration::from_millis(5))
        .with_jitter(false)
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let flaky = Arc::new(FlakySource::new(Some(grid_source().await), 2));
    let source = ResilientSource::new(flaky.clone()).with_retry_policy(fast_retry(3));

    let row = source
        .fetch_one("SELECT COUNT(*) AS n FROM grid.bus", &Params::new())
        .await
        .unwrap();
    assert_eq!(row.count("n"), 4);
    assert_eq!(flaky.calls(), 3);
    assert!(!source.is_degraded());
}

#[tokio::test]
async fn test_query_errors_are_not_retried() {
    let flaky = Arc::new(FlakySource::new(Some(grid_source().await), 0));
    let source = ResilientSource::new(flaky.clone()).with_retry_policy(fast_retry(5));

    let err = source
        .fetch_one("SELECT missing FROM grid.bus", &Params::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), DataErrorKind::Query);
    assert_eq!(flaky.calls(), 1);
    assert_eq!(source.fetch_one_breaker().failures(), 0);
}

#[tokio::test]
async fn test_breaker_fails_fast_after_threshold() {
    let flaky = Arc::new(FlakySource::new(None, 0).down());
    let source = ResilientSource::new(flaky.clone())
        .with_retry_policy(RetryPolicy::disabled())
        .with_breaker_config(CircuitBreakerConfig::new(2, Duration::from_secs(60)));

    for _ in 0..2 {
        let err = source.fetch_one("SELECT 1", &Params::new()).await.unwrap_err();
        assert_eq!(err.kind(), DataErrorKind::Connection);
    }
    assert_eq!(source.fetch_one_breaker().state(), CircuitState::Open);

    let err = source.fetch_one("SELECT 1", &Params::new()).await.unwrap_err();
    assert_eq!(err.kind(), DataErrorKind::CircuitOpen);
    assert_eq!(flaky.calls(), 2);
    assert!(source.is_degraded());

    // fetch_all has its own breaker
    assert_eq!(source.fetch_all_breaker().state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_recovers_after_cool_down() {
    let flaky = Arc::new(FlakySource::new(None, 0).down());
    let source = ResilientSource::new(flaky.clone())
        .with_retry_policy(RetryPolicy::disabled())
        .with_breaker_config(CircuitBreakerConfig::new(1, Duration::from_secs(30)));

    source.fetch_one("SELECT 1", &Params::new()).await.unwrap_err();
    assert_eq!(source.fetch_one_breaker().state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(10)).await;
    let err = source.fetch_one("SELECT 1", &Params::new()).await.unwrap_err();
    assert_eq!(err.kind(), DataErrorKind::CircuitOpen);
    assert_eq!(flaky.calls(), 1);

    flaky.down.store(false, Ordering::SeqCst);
    tokio::time::advance(Duration::from_secs(21)).await;
    source.fetch_one("SELECT 1", &Params::new()).await.unwrap();
    assert_eq!(flaky.calls(), 2);
    assert_eq!(source.fetch_one_breaker().state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_outage_still_yields_a_result_per_rule() {
    let out = TempDir::new().unwrap();
    let ctx = run_context(out.path(), "outage");
    let config = EngineConfig::new()
        .with_retry_policy(fast_retry(2))
        .with_breaker_config(CircuitBreakerConfig::new(2, Duration::from_secs(60)));
    let runner = TaskRunner::new(
        Arc::new(adhoc_registry()),
        ResultRepository::for_context(&ctx),
        config,
    );

    let source = runner.resilient(Arc::new(FlakySource::new(None, 0).down()));
    let summary = runner.run_task("adhoc", source, &ctx).await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(runner.repository().log_files().await.unwrap().len(), 3);
    for result in &summary.results {
        assert!(!result.success);
        assert_eq!(result.severity, Severity::Error, "{}", result.message);
    }
    let database_errors = summary
        .results
        .iter()
        .filter(|r| r.message.starts_with("Database error:"))
        .count();
    // The custom rule never touches the source
    assert_eq!(database_errors, 2);
}
