//! Manifest entries describing what a task intends to run.

use super::{Rule, RuleKind};
use serde::{Deserialize, Serialize};

/// One manifest entry: a rule a task is expected to produce a result for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExpectedRule {
    pub rule_id: String,
    pub task: String,
    pub table: String,
    #[serde(default)]
    pub kind: RuleKind,
    #[serde(default)]
    pub rule_class: String,
}

impl ExpectedRule {
    /// Returns the `(rule_id, table)` key results are matched on.
    pub fn key(&self) -> (&str, &str) {
        (&self.rule_id, &self.table)
    }
}

impl From<&Rule> for ExpectedRule {
    fn from(rule: &Rule) -> Self {
        Self {
            rule_id: rule.rule_id().to_string(),
            task: rule.task().to_string(),
            table: rule.table().qualified(),
            kind: rule.kind(),
            rule_class: rule.rule_class().to_string(),
        }
    }
}
