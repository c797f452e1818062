//! Circuit breaker guarding a single data access primitive.

use crate::error::{DataError, DataResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls fail fast until the cool-down has elapsed.
    Open,
    /// A single trial call is probing the backend.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(name)
    }
}

/// Thresholds for a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive eligible failures that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call is allowed
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// A circuit breaker with an explicit CLOSED / OPEN / HALF_OPEN state machine.
///
/// Only transient data errors (connection, timeout, operational) count as
/// failures. Any other outcome proves the backend answered, so it resets the
/// failure count and closes the circuit.
///
/// While OPEN, calls return [`DataErrorKind::CircuitOpen`](crate::error::DataErrorKind)
/// without running the operation. Once the recovery timeout has elapsed the
/// next caller becomes the single HALF_OPEN trial; concurrent callers keep
/// failing fast until the trial settles.
///
/// # Examples
///
/// ```rust
/// use term_rules::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
/// use std::time::Duration;
///
/// let breaker = CircuitBreaker::new(
///     "fetch_one",
///     CircuitBreakerConfig::new(3, Duration::from_secs(10)),
/// );
/// assert_eq!(breaker.state(), CircuitState::Closed);
/// assert_eq!(breaker.failures(), 0);
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Returns the current state.
    ///
    /// An OPEN breaker whose cool-down has elapsed still reports OPEN until
    /// the next call turns it HALF_OPEN.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Returns the consecutive failure count.
    pub fn failures(&self) -> u32 {
        self.lock().failures
    }

    /// Forces the breaker back to CLOSED.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
        info!(breaker = %self.name, "Circuit breaker reset");
    }

    /// Runs `f` through the breaker.
    pub async fn call<T, F, Fut>(&self, f: F) -> DataResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DataResult<T>>,
    {
        let mut attempt = self.admit()?;
        let result = f().await;
        match &result {
            Err(e) if e.is_transient() => attempt.fail(e),
            _ => attempt.succeed(),
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn admit(&self) -> DataResult<Attempt<'_>> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Attempt::new(self, false)),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!(breaker = %self.name, "Circuit breaker HALF_OPEN, allowing trial call");
                    Ok(Attempt::new(self, true))
                } else {
                    Err(DataError::circuit_open(
                        &self.name,
                        inner.failures,
                        self.config.recovery_timeout - elapsed,
                    ))
                }
            }
            CircuitState::HalfOpen if inner.trial_in_flight => Err(DataError::circuit_open(
                &self.name,
                inner.failures,
                Duration::ZERO,
            )),
            CircuitState::HalfOpen => {
                inner.trial_in_flight = true;
                Ok(Attempt::new(self, true))
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
        if previous != CircuitState::Closed {
            info!(breaker = %self.name, "Circuit breaker CLOSED, backend recovered");
        }
    }

    fn record_failure(&self, trial: bool, reason: &str) {
        let mut inner = self.lock();
        inner.failures = inner.failures.saturating_add(1);
        if trial {
            inner.trial_in_flight = false;
        }

        if trial || inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            warn!(
                breaker = %self.name,
                failures = inner.failures,
                error = reason,
                "Circuit breaker trial failed, reopening"
            );
        } else if inner.state == CircuitState::Closed
            && inner.failures >= self.config.failure_threshold
        {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            error!(
                breaker = %self.name,
                failures = inner.failures,
                recovery_secs = self.config.recovery_timeout.as_secs_f64(),
                error = reason,
                "Circuit breaker OPEN"
            );
        }
    }
}

/// An admitted call. A trial that is dropped before settling counts as a
/// failed trial so the breaker cannot stay stuck in HALF_OPEN.
struct Attempt<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Attempt<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn succeed(&mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    fn fail(&mut self, err: &DataError) {
        self.settled = true;
        self.breaker.record_failure(self.trial, &err.to_string());
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.record_failure(true, "trial call cancelled");
        }
    }
}
