//! Retry and circuit breaking around data access.
//!
//! The two mechanisms compose as `retry(breaker(op))`: every attempt passes
//! through the breaker, and an open breaker produces a non-retryable error
//! so the retry loop stops instead of hammering a dead backend.
//! [`ResilientSource`](crate::sources::ResilientSource) applies this to both
//! data source primitives.

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::RetryPolicy;
