//! Opaque key/value parameter bags attached to rules and queries.

use crate::error::{RuleError, RuleOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Parameters of a rule registration or a query.
///
/// Values are stored as JSON so registrations can carry numbers, strings and
/// lists without the registry knowing what a rule expects.
///
/// # Examples
///
/// ```rust
/// use term_rules::core::Params;
///
/// let params = Params::new()
///     .with("column", "demand")
///     .with("max_val", 1.2)
///     .with("expected_values", vec!["eGon2035", "eGon100RE"]);
///
/// assert_eq!(params.str("column"), Some("demand"));
/// assert_eq!(params.f64("max_val"), Some(1.2));
/// assert_eq!(params.str_list("expected_values").unwrap().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    /// Creates an empty parameter bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, replacing any previous value for the key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a parameter in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns a copy of these parameters overlaid with `overrides`.
    pub fn merged(&self, overrides: &Params) -> Params {
        let mut merged = self.0.clone();
        for (key, value) in &overrides.0 {
            merged.insert(key.clone(), value.clone());
        }
        Params(merged)
    }

    /// Returns the raw JSON value for a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns true if a non-null value is present for the key.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_null())
    }

    /// Returns a string parameter.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Returns a numeric parameter, accepting numeric strings.
    pub fn f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(value_as_f64)
    }

    /// Returns an integer parameter, accepting integral floats and numeric strings.
    pub fn i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(value_as_i64)
    }

    /// Returns a boolean parameter.
    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Returns a list parameter rendered as strings.
    pub fn str_list(&self, key: &str) -> Option<Vec<String>> {
        let items = self.get(key)?.as_array()?;
        Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        )
    }

    /// Returns a string parameter or a logic error naming the missing key.
    pub fn require_str(&self, key: &str) -> RuleOutcome<&str> {
        self.str(key).ok_or_else(|| RuleError::missing_param(key))
    }

    /// Returns a numeric parameter or a logic error naming the missing key.
    pub fn require_f64(&self, key: &str) -> RuleOutcome<f64> {
        self.f64(key).ok_or_else(|| RuleError::missing_param(key))
    }

    /// Iterates over parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Params(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Interprets a JSON value as a float.
///
/// Databases return `NUMERIC` and `BIGINT` aggregates as strings through
/// some drivers, so numeric strings are accepted.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Interprets a JSON value as an integer.
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_accessors() {
        let params = Params::new()
            .with("column", "value")
            .with("min_val", 0)
            .with("max_val", "1.2")
            .with("strict", true);

        assert_eq!(params.str("column"), Some("value"));
        assert_eq!(params.f64("min_val"), Some(0.0));
        assert_eq!(params.f64("max_val"), Some(1.2));
        assert_eq!(params.i64("min_val"), Some(0));
        assert_eq!(params.bool("strict"), Some(true));
        assert_eq!(params.str("missing"), None);
    }

    #[test]
    fn test_require_reports_missing_key() {
        let params = Params::new();
        let err = params.require_str("column").unwrap_err();
        assert!(err.to_string().contains("column"));
        assert!(params.require_f64("threshold").is_err());
    }

    #[test]
    fn test_merged_overrides_defaults() {
        let defaults = Params::new().with("column", "a").with("max_val", 1.0);
        let overrides = Params::new().with("column", "b");
        let merged = defaults.merged(&overrides);

        assert_eq!(merged.str("column"), Some("b"));
        assert_eq!(merged.f64("max_val"), Some(1.0));
        assert_eq!(defaults.str("column"), Some("a"));
    }

    #[test]
    fn test_str_list_renders_numbers() {
        let params = Params::new().with("values", json!(["a", 1, 2.5]));
        assert_eq!(
            params.str_list("values"),
            Some(vec!["a".to_string(), "1".to_string(), "2.5".to_string()])
        );
    }

    #[test]
    fn test_contains_ignores_null() {
        let params = Params::new().with("scenario_col", Value::Null);
        assert!(!params.contains("scenario_col"));
        assert!(params.get("scenario_col").is_some());
    }

    #[test]
    fn test_value_as_i64() {
        assert_eq!(value_as_i64(&json!(42)), Some(42));
        assert_eq!(value_as_i64(&json!(42.0)), Some(42));
        assert_eq!(value_as_i64(&json!(42.5)), None);
        assert_eq!(value_as_i64(&json!("17")), Some(17));
        assert_eq!(value_as_i64(&json!(null)), None);
    }
}
