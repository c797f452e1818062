//! Engine configuration.

use crate::error::{Result, RulesError};
use crate::logging::LogConfig;
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};
use std::time::Duration;

/// Environment variable overriding [`EngineConfig::max_workers`].
pub const MAX_WORKERS_ENV: &str = "TERM_RULES_MAX_WORKERS";

/// Environment variable setting [`EngineConfig::task_timeout`] in seconds.
pub const TASK_TIMEOUT_ENV: &str = "TERM_RULES_TASK_TIMEOUT_SECS";

/// Catalog query counting user tables on PostgreSQL.
pub const POSTGRES_TABLE_COUNT_QUERY: &str = "SELECT COUNT(*) AS total_tables FROM pg_tables \
     WHERE schemaname NOT IN ('information_schema', 'pg_catalog', 'pg_toast')";

/// Configuration for running tasks.
///
/// # Examples
///
/// ```rust
/// use term_rules::config::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig::new()
///     .with_max_workers(8)
///     .with_task_timeout(Duration::from_secs(3600));
///
/// assert_eq!(config.max_workers(), 8);
/// assert_eq!(config.task_timeout(), Some(Duration::from_secs(3600)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    max_workers: usize,
    task_timeout: Option<Duration>,
    rule_timeout: Option<Duration>,
    retry: RetryPolicy,
    breaker: CircuitBreakerConfig,
    table_count_query: String,
    logging: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            task_timeout: None,
            rule_timeout: None,
            retry: RetryPolicy::database(),
            breaker: CircuitBreakerConfig::default(),
            table_count_query: POSTGRES_TABLE_COUNT_QUERY.to_string(),
            logging: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the defaults, then applies `TERM_RULES_MAX_WORKERS` and
    /// `TERM_RULES_TASK_TIMEOUT_SECS` when set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(MAX_WORKERS_ENV) {
            let workers: usize = raw.trim().parse().map_err(|_| {
                RulesError::Configuration(format!(
                    "{MAX_WORKERS_ENV} must be a positive integer, got '{raw}'"
                ))
            })?;
            if workers == 0 {
                return Err(RulesError::Configuration(format!(
                    "{MAX_WORKERS_ENV} must be at least 1"
                )));
            }
            config.max_workers = workers;
        }

        if let Some(raw) = lookup(TASK_TIMEOUT_ENV) {
            let secs: f64 = raw.trim().parse().map_err(|_| {
                RulesError::Configuration(format!(
                    "{TASK_TIMEOUT_ENV} must be a number of seconds, got '{raw}'"
                ))
            })?;
            if !secs.is_finite() || secs <= 0.0 {
                return Err(RulesError::Configuration(format!(
                    "{TASK_TIMEOUT_ENV} must be positive"
                )));
            }
            config.task_timeout = Some(Duration::from_secs_f64(secs));
        }

        Ok(config)
    }

    /// Sets the number of rules executed concurrently. Clamped to at least 1.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Bounds the wall time of a whole task.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    /// Bounds the wall time of each rule.
    pub fn with_rule_timeout(mut self, timeout: Duration) -> Self {
        self.rule_timeout = Some(timeout);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker_config(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Sets the catalog query used to count tables in the database.
    pub fn with_table_count_query(mut self, query: impl Into<String>) -> Self {
        self.table_count_query = query.into();
        self
    }

    pub fn with_log_config(mut self, logging: LogConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout
    }

    pub fn rule_timeout(&self) -> Option<Duration> {
        self.rule_timeout
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        self.breaker
    }

    pub fn table_count_query(&self) -> &str {
        &self.table_count_query
    }

    pub fn log_config(&self) -> &LogConfig {
        &self.logging
    }
}
