//! Rule result records.

use super::{RuleKind, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// An observed or expected value: either numeric or free text such as `">0"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultValue {
    Number(f64),
    Text(String),
}

impl ResultValue {
    /// Returns the numeric value, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ResultValue::Number(n) => Some(*n),
            ResultValue::Text(_) => None,
        }
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::Number(n) => write!(f, "{n}"),
            ResultValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ResultValue {
    fn from(value: f64) -> Self {
        ResultValue::Number(value)
    }
}

impl From<i64> for ResultValue {
    fn from(value: i64) -> Self {
        ResultValue::Number(value as f64)
    }
}

impl From<usize> for ResultValue {
    fn from(value: usize) -> Self {
        ResultValue::Number(value as f64)
    }
}

impl From<&str> for ResultValue {
    fn from(value: &str) -> Self {
        ResultValue::Text(value.to_string())
    }
}

impl From<String> for ResultValue {
    fn from(value: String) -> Self {
        ResultValue::Text(value)
    }
}

/// The outcome of one rule execution.
///
/// A result is built once by the rule (or by the engine when the rule
/// fails), stamped with timing, appended to the rule's log and never touched
/// again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub task: String,
    /// Schema-qualified table reference as registered
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub kind: RuleKind,
    /// Concrete implementation name; defaulted by the engine when empty
    #[serde(default)]
    pub rule_class: String,
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub observed: Option<ResultValue>,
    #[serde(default)]
    pub expected: Option<ResultValue>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Wall-clock execution time in seconds
    #[serde(default)]
    pub execution_time: Option<f64>,
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
}

impl RuleResult {
    /// Creates a result with severity derived from `success`.
    ///
    /// Prefer [`Rule::make_result`](super::Rule::make_result), which fills in
    /// identity fields from the rule.
    pub fn new(
        rule_id: impl Into<String>,
        task: impl Into<String>,
        table: impl Into<String>,
        success: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            task: task.into(),
            table: table.into(),
            schema: None,
            kind: RuleKind::default(),
            rule_class: String::new(),
            success,
            message: message.into(),
            observed: None,
            expected: None,
            severity: Severity::derive(success),
            column: None,
            execution_time: None,
            executed_at: None,
        }
    }

    /// Sets the observed value.
    pub fn with_observed(mut self, observed: impl Into<ResultValue>) -> Self {
        self.observed = Some(observed.into());
        self
    }

    /// Sets the expected value.
    pub fn with_expected(mut self, expected: impl Into<ResultValue>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    /// Overrides the derived severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Records the column the rule inspected.
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Sets the implementation name.
    pub fn with_rule_class(mut self, rule_class: impl Into<String>) -> Self {
        self.rule_class = rule_class.into();
        self
    }

    /// Sets the rule kind.
    pub fn with_kind(mut self, kind: RuleKind) -> Self {
        self.kind = kind;
        self
    }

    /// Stamps execution timing.
    pub fn with_timing(mut self, elapsed: Duration, executed_at: DateTime<Utc>) -> Self {
        self.execution_time = Some(elapsed.as_secs_f64());
        self.executed_at = Some(executed_at);
        self
    }

    /// Returns the dataset this result belongs to.
    pub fn dataset(&self) -> &str {
        &self.table
    }
}
