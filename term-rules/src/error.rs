//! Error types for the term-rules execution engine.
//!
//! Errors are split along the isolation boundaries of a validation run:
//!
//! - [`DataError`] is raised by a [`DataSource`](crate::sources::DataSource)
//!   and carries a [`DataErrorKind`] that the resilience layer inspects to
//!   decide whether to retry or trip a circuit breaker.
//! - [`RuleError`] is raised inside a single rule's unit of work. The engine
//!   converts every `RuleError` into exactly one failing `RuleResult`.
//! - [`RegistryError`] is raised while registering rules at startup.
//! - [`RulesError`] is the crate-level error. Only task-resolution failures,
//!   persistence failures and task-level timeouts surface as `RulesError`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of data access failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataErrorKind {
    /// The connection could not be established or was dropped.
    Connection,
    /// The data source did not answer in time.
    Timeout,
    /// The query failed while executing for an operational reason.
    Operational,
    /// The query itself is invalid (bad SQL, unknown table or column).
    Query,
    /// A circuit breaker refused the call without invoking the data source.
    CircuitOpen,
}

impl DataErrorKind {
    /// Returns true for kinds that are worth retrying and count towards a
    /// circuit breaker's failure threshold.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DataErrorKind::Connection | DataErrorKind::Timeout | DataErrorKind::Operational
        )
    }
}

impl std::fmt::Display for DataErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DataErrorKind::Connection => "connection",
            DataErrorKind::Timeout => "timeout",
            DataErrorKind::Operational => "operational",
            DataErrorKind::Query => "query",
            DataErrorKind::CircuitOpen => "circuit_open",
        };
        f.write_str(name)
    }
}

/// An error raised by a data source primitive.
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct DataError {
    kind: DataErrorKind,
    message: String,
}

impl DataError {
    /// Creates a data error of the given kind.
    pub fn new(kind: DataErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(DataErrorKind::Connection, message)
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(DataErrorKind::Timeout, message)
    }

    /// Creates an operational error.
    pub fn operational(message: impl Into<String>) -> Self {
        Self::new(DataErrorKind::Operational, message)
    }

    /// Creates a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::new(DataErrorKind::Query, message)
    }

    /// Creates a circuit-open error for the named operation.
    pub fn circuit_open(operation: &str, failures: u32, retry_in: Duration) -> Self {
        Self::new(
            DataErrorKind::CircuitOpen,
            format!(
                "circuit breaker is OPEN for {operation} after {failures} failures, retry in {:.1}s",
                retry_in.as_secs_f64()
            ),
        )
    }

    /// Returns the error kind.
    pub fn kind(&self) -> DataErrorKind {
        self.kind
    }

    /// Returns the error message without the kind prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if this error is transient and the call may be retried.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Returns true if this error points at lost connectivity rather than a
    /// problem with one query.
    pub fn is_connection(&self) -> bool {
        matches!(
            self.kind,
            DataErrorKind::Connection | DataErrorKind::CircuitOpen
        ) || self.message.to_lowercase().contains("connection")
    }
}

/// Result type for data source operations.
pub type DataResult<T> = std::result::Result<T, DataError>;

/// An error raised while a single rule executes.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Data access failed underneath the rule.
    #[error(transparent)]
    Data(#[from] DataError),

    /// The rule's own query building or evaluation logic failed.
    #[error("{0}")]
    Logic(String),

    /// The rule exceeded its allotted time.
    #[error("rule timed out after {0:?}")]
    Timeout(Duration),
}

impl RuleError {
    /// Creates a logic error.
    pub fn logic(message: impl Into<String>) -> Self {
        RuleError::Logic(message.into())
    }

    /// Creates a logic error for a missing rule parameter.
    pub fn missing_param(name: &str) -> Self {
        RuleError::Logic(format!("missing required parameter '{name}'"))
    }
}

/// Result type for rule operations.
pub type RuleOutcome<T> = std::result::Result<T, RuleError>;

/// An error raised while registering rules.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A rule with the same id is already registered for this task and table.
    #[error("rule '{rule_id}' is already registered for task '{task}' on '{table}'")]
    Duplicate {
        task: String,
        rule_id: String,
        table: String,
    },

    /// The table reference is not a valid `schema.table` identifier.
    #[error("invalid table reference '{table}': {reason}")]
    InvalidTable { table: String, reason: String },
}

/// The main error type for term-rules.
#[derive(Debug, Error)]
pub enum RulesError {
    /// No rules are registered for the requested task.
    #[error("no rules registered for task '{0}'")]
    UnknownTask(String),

    /// Registration failed.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The data source could not be reached at all.
    #[error("Data source error: {0}")]
    DataSource(#[from] DataError),

    /// The whole task exceeded its time budget.
    #[error("task '{task}' timed out after {timeout:?} with {completed} of {total} rules completed")]
    TaskTimeout {
        task: String,
        timeout: Duration,
        completed: usize,
        total: usize,
    },

    /// Error from I/O operations on the result directory.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Security-related error.
    #[error("Security error: {0}")]
    SecurityError(String),
}

/// A type alias for `Result<T, RulesError>`.
pub type Result<T> = std::result::Result<T, RulesError>;

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<RulesError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| match e.into() {
            RulesError::Internal(inner) => RulesError::Internal(format!("{msg}: {inner}")),
            other => RulesError::Internal(format!("{msg}: {other}")),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let msg = f();
            match e.into() {
                RulesError::Internal(inner) => RulesError::Internal(format!("{msg}: {inner}")),
                other => RulesError::Internal(format!("{msg}: {other}")),
            }
        })
    }
}
