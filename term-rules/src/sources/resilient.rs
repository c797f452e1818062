//! Data source decorator adding retries and circuit breakers.

use super::{DataSource, Row};
use crate::core::Params;
use crate::error::DataResult;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryPolicy};
use async_trait::async_trait;
use std::sync::Arc;

/// Wraps another [`DataSource`] with `retry(breaker(op))` on each primitive.
///
/// `fetch_one` and `fetch_all` have separate breakers, so a burst of
/// failing aggregate queries does not block materializing queries and vice
/// versa.
///
/// # Examples
///
/// ```rust
/// use datafusion::prelude::SessionContext;
/// use term_rules::resilience::{CircuitBreakerConfig, RetryPolicy};
/// use term_rules::sources::{DataFusionSource, ResilientSource};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let inner = Arc::new(DataFusionSource::new(SessionContext::new()));
/// let source = ResilientSource::new(inner)
///     .with_retry_policy(RetryPolicy::database())
///     .with_breaker_config(CircuitBreakerConfig::new(5, Duration::from_secs(30)));
/// ```
#[derive(Debug)]
pub struct ResilientSource {
    inner: Arc<dyn DataSource>,
    retry: RetryPolicy,
    fetch_one_breaker: CircuitBreaker,
    fetch_all_breaker: CircuitBreaker,
}

impl ResilientSource {
    /// Wraps `inner` with the database retry preset and default breakers.
    pub fn new(inner: Arc<dyn DataSource>) -> Self {
        Self {
            inner,
            retry: RetryPolicy::database(),
            fetch_one_breaker: CircuitBreaker::new("fetch_one", CircuitBreakerConfig::default()),
            fetch_all_breaker: CircuitBreaker::new("fetch_all", CircuitBreakerConfig::default()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces both breakers with fresh ones using `config`.
    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.fetch_one_breaker = CircuitBreaker::new("fetch_one", config);
        self.fetch_all_breaker = CircuitBreaker::new("fetch_all", config);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn fetch_one_breaker(&self) -> &CircuitBreaker {
        &self.fetch_one_breaker
    }

    pub fn fetch_all_breaker(&self) -> &CircuitBreaker {
        &self.fetch_all_breaker
    }

    /// Returns true if either breaker is currently refusing calls.
    pub fn is_degraded(&self) -> bool {
        self.fetch_one_breaker.state() != CircuitState::Closed
            || self.fetch_all_breaker.state() != CircuitState::Closed
    }
}

#[async_trait]
impl DataSource for ResilientSource {
    async fn fetch_one(&self, query: &str, params: &Params) -> DataResult<Row> {
        let inner = &self.inner;
        let breaker = &self.fetch_one_breaker;
        self.retry
            .run("fetch_one", move || {
                breaker.call(move || inner.fetch_one(query, params))
            })
            .await
    }

    async fn fetch_all(&self, query: &str, params: &Params) -> DataResult<Vec<Row>> {
        let inner = &self.inner;
        let breaker = &self.fetch_all_breaker;
        self.retry
            .run("fetch_all", move || {
                breaker.call(move || inner.fetch_all(query, params))
            })
            .await
    }

    fn description(&self) -> String {
        format!("resilient({})", self.inner.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DataError, DataErrorKind};
    use crate::test_helpers::ScriptedSource;
    use std::time::Duration;

    fn resilient(inner: Arc<ScriptedSource>, threshold: u32) -> ResilientSource {
        ResilientSource::new(inner)
            .with_retry_policy(RetryPolicy::database().with_jitter(false))
            .with_breaker_config(CircuitBreakerConfig::new(threshold, Duration::from_secs(30)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures() {
        let inner = Arc::new(
            ScriptedSource::new()
                .with_count("grid.bus", 5)
                .fail_first(2, DataError::connection("connection reset by peer")),
        );
        let source = resilient(inner.clone(), 5);

        let row = source
            .fetch_one("SELECT COUNT(*) AS total_count FROM grid.bus", &Params::new())
            .await
            .unwrap();

        assert_eq!(row.get("total_count"), Some(&serde_json::json!(5)));
        assert_eq!(inner.queries().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_stops_retries() {
        let inner = Arc::new(
            ScriptedSource::new().fail_first(u32::MAX, DataError::timeout("statement timeout")),
        );
        let source = resilient(inner.clone(), 2);

        let err = source.fetch_all("SELECT 1", &Params::new()).await.unwrap_err();
        assert_eq!(err.kind(), DataErrorKind::CircuitOpen);
        assert_eq!(inner.queries().len(), 2, "third attempt is refused by the breaker");
        assert!(source.is_degraded());
        assert_eq!(source.fetch_one_breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_query_errors_are_not_retried() {
        let inner = Arc::new(ScriptedSource::new().fail_first(1, DataError::query("bad sql")));
        let source = resilient(inner.clone(), 5);

        let err = source.fetch_one("SELECT nope", &Params::new()).await.unwrap_err();
        assert_eq!(err.kind(), DataErrorKind::Query);
        assert_eq!(inner.queries().len(), 1);
    }
}
