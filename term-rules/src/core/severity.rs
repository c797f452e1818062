//! Result severity levels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The severity of a rule result.
///
/// Levels are ordered by severity: Error > Warning > Info.
///
/// - **Error**: the rule could not be evaluated (logic defect, lost
///   connectivity) or an explicitly critical check failed
/// - **Warning**: the rule ran and the data violated it
/// - **Info**: the rule passed, or a non-fatal condition such as an empty
///   target table
///
/// # Examples
///
/// ```rust
/// use term_rules::core::Severity;
///
/// assert_eq!(Severity::derive(true), Severity::Info);
/// assert_eq!(Severity::derive(false), Severity::Warning);
/// assert!(Severity::Error > Severity::Warning);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Informational outcome
    Info = 0,
    /// The data violated the rule
    #[default]
    Warning = 1,
    /// The rule could not be evaluated or failed critically
    Error = 2,
}

impl Severity {
    /// Derives the default severity from a result's success flag.
    pub fn derive(success: bool) -> Self {
        if success {
            Severity::Info
        } else {
            Severity::Warning
        }
    }

    /// Returns the string representation of the severity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }

    /// Checks if this severity is at least as high as another.
    pub fn is_at_least(&self, other: Severity) -> bool {
        *self >= other
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
