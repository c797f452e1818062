//! Post-run aggregation of rule logs into results and coverage.
//!
//! Aggregation only reads what the runners wrote, so it can run in a
//! separate process after every task finished. Running it twice over the
//! same directory produces identical outputs.
//!
//! ```rust,no_run
//! use term_rules::aggregation::Aggregator;
//! use term_rules::repository::ResultRepository;
//!
//! # async fn example() -> term_rules::error::Result<()> {
//! let repository = ResultRepository::new("./validation_runs", "nightly");
//! let aggregator = Aggregator::new(&repository);
//! let collected = aggregator.collect().await?;
//! let coverage = aggregator.build_coverage(&collected).await?;
//! aggregator.write_outputs(&collected, &coverage).await?;
//! # Ok(())
//! # }
//! ```

mod coverage;

pub use coverage::{
    CoverageCell, CoverageReport, CoverageStatus, RuleApplication, RuleCoverage, TableCoverage,
    ValidationStats,
};

use crate::core::{ExpectedRule, RuleResult};
use crate::error::Result;
use crate::registry::Registry;
use crate::repository::ResultRepository;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use tracing::{info, instrument, warn};

pub const RESULTS_FILE: &str = "results.json";
pub const COVERAGE_FILE: &str = "coverage.json";

/// The current result of every rule log in a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CollectedResults {
    /// One result per log file, sorted by task, rule id and table
    pub items: Vec<RuleResult>,
    /// Distinct tables with at least one result, sorted
    pub datasets: Vec<String>,
    /// Every manifest entry of every task
    #[serde(default)]
    pub expected: Vec<ExpectedRule>,
    /// Manifest entries that never produced a result
    #[serde(default)]
    pub missing: Vec<ExpectedRule>,
}

impl CollectedResults {
    /// Builds the collection from per-log results and manifest entries.
    pub fn from_items(mut items: Vec<RuleResult>, mut expected: Vec<ExpectedRule>) -> Self {
        items.sort_by(|a, b| {
            (&a.task, &a.rule_id, &a.table).cmp(&(&b.task, &b.rule_id, &b.table))
        });
        expected.sort();
        expected.dedup();

        let datasets: BTreeSet<&str> = items.iter().map(RuleResult::dataset).collect();
        let produced: HashSet<(&str, &str, &str)> = items
            .iter()
            .map(|r| (r.task.as_str(), r.rule_id.as_str(), r.table.as_str()))
            .collect();
        let missing = expected
            .iter()
            .filter(|e| {
                !produced.contains(&(e.task.as_str(), e.rule_id.as_str(), e.table.as_str()))
            })
            .cloned()
            .collect();

        Self {
            datasets: datasets.into_iter().map(str::to_string).collect(),
            items,
            expected,
            missing,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Reads a run directory and produces the final artifacts.
#[derive(Debug)]
pub struct Aggregator<'a> {
    repository: &'a ResultRepository,
    registry: Option<&'a Registry>,
    total_tables: Option<u64>,
}

impl<'a> Aggregator<'a> {
    pub fn new(repository: &'a ResultRepository) -> Self {
        Self {
            repository,
            registry: None,
            total_tables: None,
        }
    }

    /// Uses the registry as a fallback source of rule classes.
    pub fn with_registry(mut self, registry: &'a Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Overrides the cached database table count.
    pub fn with_total_tables(mut self, total_tables: u64) -> Self {
        self.total_tables = Some(total_tables);
        self
    }

    /// Reads the last complete result of every rule log in the run.
    #[instrument(skip(self), fields(run_dir = %self.repository.run_dir().display()))]
    pub async fn collect(&self) -> Result<CollectedResults> {
        let mut items = Vec::new();
        for path in self.repository.log_files().await? {
            match self.repository.read_last_result(&path).await? {
                Some(result) => items.push(result),
                None => warn!(path = %path.display(), "Rule log holds no complete result"),
            }
        }
        let expected = self.repository.read_all_manifests().await?;
        let collected = CollectedResults::from_items(items, expected);

        info!(
            results = collected.items.len(),
            datasets = collected.datasets.len(),
            missing = collected.missing.len(),
            "Collected rule results"
        );
        Ok(collected)
    }

    /// Builds the coverage report for collected results.
    pub async fn build_coverage(&self, collected: &CollectedResults) -> Result<CoverageReport> {
        let total_tables = match self.total_tables {
            Some(total) => total,
            None => self
                .repository
                .read_metadata()
                .await?
                .map(|m| m.total_tables)
                .unwrap_or(0),
        };
        Ok(CoverageReport::build(collected, self.registry, total_tables))
    }

    /// Writes `final/results.json` and `final/coverage.json`.
    pub async fn write_outputs(
        &self,
        collected: &CollectedResults,
        coverage: &CoverageReport,
    ) -> Result<PathBuf> {
        self.repository.write_final(RESULTS_FILE, collected).await?;
        self.repository.write_final(COVERAGE_FILE, coverage).await?;
        let final_dir = self.repository.final_dir();
        info!(
            final_dir = %final_dir.display(),
            success_rate = coverage.validation_results.success_rate,
            "Wrote aggregated outputs"
        );
        Ok(final_dir)
    }

    /// Collects, builds coverage and writes the outputs in one step.
    pub async fn run(&self) -> Result<(CollectedResults, CoverageReport)> {
        let collected = self.collect().await?;
        let coverage = self.build_coverage(&collected).await?;
        self.write_outputs(&collected, &coverage).await?;
        Ok((collected, coverage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RuleKind;
    use crate::repository::RunMetadata;
    use tempfile::TempDir;

    fn result(rule_id: &str, table: &str, success: bool) -> RuleResult {
        RuleResult::new(rule_id, "t1", table, success, "m").with_rule_class(rule_id)
    }

    #[tokio::test]
    async fn test_collect_takes_last_line_and_finds_missing() {
        let dir = TempDir::new().unwrap();
        let repo = ResultRepository::new(dir.path(), "run");

        repo.write_manifest(
            "t1",
            &[
                ExpectedRule {
                    rule_id: "A".into(),
                    task: "t1".into(),
                    table: "s.x".into(),
                    kind: RuleKind::Formal,
                    rule_class: "A".into(),
                },
                ExpectedRule {
                    rule_id: "B".into(),
                    task: "t1".into(),
                    table: "s.y".into(),
                    kind: RuleKind::Formal,
                    rule_class: "B".into(),
                },
            ],
        )
        .await
        .unwrap();
        repo.append_result(&result("A", "s.x", false)).await.unwrap();
        repo.append_result(&result("A", "s.x", true)).await.unwrap();

        let collected = Aggregator::new(&repo).collect().await.unwrap();
        assert_eq!(collected.len(), 1);
        assert!(collected.items[0].success);
        assert_eq!(collected.datasets, vec!["s.x"]);
        assert_eq!(collected.missing.len(), 1);
        assert_eq!(collected.missing[0].rule_id, "B");
    }

    #[tokio::test]
    async fn test_total_tables_from_metadata_or_override() {
        let dir = TempDir::new().unwrap();
        let repo = ResultRepository::new(dir.path(), "run");
        repo.append_result(&result("A", "s.x", true)).await.unwrap();
        repo.write_metadata(&RunMetadata { total_tables: 4 })
            .await
            .unwrap();

        let aggregator = Aggregator::new(&repo);
        let collected = aggregator.collect().await.unwrap();
        let coverage = aggregator.build_coverage(&collected).await.unwrap();
        assert_eq!(coverage.table_coverage.percentage, 25.0);

        let overridden = Aggregator::new(&repo)
            .with_total_tables(2)
            .build_coverage(&collected)
            .await
            .unwrap();
        assert_eq!(overridden.table_coverage.percentage, 50.0);
    }

    #[tokio::test]
    async fn test_outputs_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let repo = ResultRepository::new(dir.path(), "run");
        repo.append_result(&result("A", "s.x", true)).await.unwrap();
        repo.append_result(&result("B", "s.y", false)).await.unwrap();

        let aggregator = Aggregator::new(&repo);
        aggregator.run().await.unwrap();
        let first = std::fs::read(repo.final_dir().join(COVERAGE_FILE)).unwrap();
        aggregator.run().await.unwrap();
        let second = std::fs::read(repo.final_dir().join(COVERAGE_FILE)).unwrap();
        assert_eq!(first, second);
        assert!(repo.final_dir().join(RESULTS_FILE).exists());
    }

    #[tokio::test]
    async fn test_empty_run_collects_nothing() {
        let dir = TempDir::new().unwrap();
        let repo = ResultRepository::new(dir.path(), "never_ran");
        let collected = Aggregator::new(&repo).collect().await.unwrap();
        assert!(collected.is_empty());
        assert!(collected.datasets.is_empty());
    }
}
