//! Security utilities for term-rules.
//!
//! Rule bodies build SQL text from table references and column names taken
//! from registration parameters. This module validates those pieces before
//! they are interpolated, and escapes literal values.

use crate::error::{Result, RulesError};
use once_cell::sync::Lazy;
use regex::Regex;

/// SQL-related security utilities.
pub struct SqlSecurity;

/// Keywords that may never appear as a bare identifier segment.
const RESERVED_SEGMENTS: &[&str] = &[
    "select", "insert", "update", "delete", "drop", "create", "alter", "union", "exec",
    "execute", "declare", "truncate", "grant", "revoke",
];

impl SqlSecurity {
    /// Validates a SQL identifier, optionally schema-qualified with dots.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use term_rules::security::SqlSecurity;
    ///
    /// assert!(SqlSecurity::validate_identifier("demand.egon_demandregio_hh").is_ok());
    /// assert!(SqlSecurity::validate_identifier("created_at").is_ok());
    /// assert!(SqlSecurity::validate_identifier("id; DROP TABLE users--").is_err());
    /// ```
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        if identifier.trim().is_empty() {
            return Err(RulesError::SecurityError(
                "SQL identifier cannot be empty or whitespace-only".to_string(),
            ));
        }

        if identifier.len() > 128 {
            return Err(RulesError::SecurityError(
                "SQL identifier too long (max 128 characters)".to_string(),
            ));
        }

        Self::validate_no_null_bytes(identifier, "SQL identifier")?;

        static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
            #[allow(clippy::expect_used)]
            Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*$")
                .expect("Hard-coded regex pattern should be valid")
        });

        if !IDENTIFIER_REGEX.is_match(identifier) {
            return Err(RulesError::SecurityError(format!(
                "Invalid SQL identifier format: '{identifier}'. Identifiers must start with a letter or underscore and contain only letters, numbers, underscores, and dots"
            )));
        }

        for segment in identifier.split('.') {
            let lower = segment.to_lowercase();
            if RESERVED_SEGMENTS.contains(&lower.as_str()) {
                return Err(RulesError::SecurityError(format!(
                    "SQL identifier segment '{segment}' is a reserved keyword"
                )));
            }
        }

        Ok(())
    }

    /// Validates an identifier and returns it unchanged for interpolation.
    pub fn identifier(identifier: &str) -> Result<&str> {
        Self::validate_identifier(identifier)?;
        Ok(identifier)
    }

    /// Validates a free-form SQL filter expression such as `gf = 4`.
    ///
    /// Statement separators and comments are rejected so the expression can
    /// only ever extend a `WHERE` clause.
    pub fn validate_filter_expression(expression: &str) -> Result<()> {
        if expression.len() > 2000 {
            return Err(RulesError::SecurityError(
                "SQL expression too long (max 2000 characters)".to_string(),
            ));
        }

        Self::validate_no_null_bytes(expression, "SQL expression")?;

        for pattern in [";", "--", "/*", "*/"] {
            if expression.contains(pattern) {
                return Err(RulesError::SecurityError(format!(
                    "SQL expression contains dangerous pattern: '{pattern}'"
                )));
            }
        }

        Ok(())
    }

    /// Renders a string as a single-quoted SQL literal.
    pub fn quote_literal(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Validates that a string doesn't contain null bytes.
    pub fn validate_no_null_bytes(value: &str, name: &str) -> Result<()> {
        if value.contains('\0') {
            return Err(RulesError::SecurityError(format!(
                "{name} cannot contain null bytes"
            )));
        }
        Ok(())
    }
}
