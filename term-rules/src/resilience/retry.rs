//! Retry with exponential backoff.

use crate::error::{DataError, DataErrorKind, DataResult};
use rand::Rng;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Retry policy for data access.
///
/// The delay before retry `attempt` (0-based) is
/// `min(base_delay * backoff_factor^attempt, max_delay)`, plus up to 10%
/// uniform jitter when enabled.
///
/// # Examples
///
/// ```rust
/// use term_rules::resilience::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::database().with_jitter(false);
/// assert_eq!(policy.delay(0), Duration::from_secs(1));
/// assert_eq!(policy.delay(1), Duration::from_secs(2));
/// assert_eq!(policy.delay(10), Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    backoff_factor: f64,
    max_delay: Duration,
    jitter: bool,
    retry_on: BTreeSet<DataErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: true,
            retry_on: [
                DataErrorKind::Connection,
                DataErrorKind::Timeout,
                DataErrorKind::Operational,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for database calls: 3 attempts, 1s base, doubling.
    pub fn database() -> Self {
        Self::default()
    }

    /// Preset for whole rule executions: 2 attempts, 0.5s base, ×1.5.
    pub fn rule_execution() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
            backoff_factor: 1.5,
            ..Self::default()
        }
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self::default().with_max_attempts(1)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replaces the set of retryable error kinds.
    pub fn with_retry_on(mut self, kinds: impl IntoIterator<Item = DataErrorKind>) -> Self {
        self.retry_on = kinds.into_iter().collect();
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Returns true if the error should be retried under this policy.
    ///
    /// An open circuit is never retried, whatever `retry_on` says.
    pub fn should_retry(&self, err: &DataError) -> bool {
        err.kind() != DataErrorKind::CircuitOpen && self.retry_on.contains(&err.kind())
    }

    /// Returns the backoff delay before retry `attempt`, without jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let extra = rand::rng().random_range(0.0..=0.1) * delay.as_secs_f64();
        delay + Duration::from_secs_f64(extra)
    }

    /// Runs `f` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` calls have been made.
    ///
    /// The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> DataResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DataResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation,
                            attempts = attempt + 1,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !self.should_retry(&e) => return Err(e),
                Err(e) if attempt + 1 >= self.max_attempts => {
                    error!(
                        operation,
                        attempts = attempt + 1,
                        error = %e,
                        "Operation failed after all retry attempts"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_with_jitter(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying operation"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
