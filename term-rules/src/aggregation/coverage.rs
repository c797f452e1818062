//! Coverage matrix and summary statistics.

use super::CollectedResults;
use crate::core::{RuleKind, RuleResult};
use crate::registry::Registry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Status of one `(dataset, rule_class)` cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoverageStatus {
    /// No result for this pair
    #[default]
    Na,
    /// Every result for this pair passed
    Ok,
    /// At least one result for this pair failed
    Fail,
}

impl CoverageStatus {
    /// Folds one more result into the status. A failure always dominates.
    pub fn merge(self, success: bool) -> Self {
        match (self, success) {
            (CoverageStatus::Fail, _) | (_, false) => CoverageStatus::Fail,
            (_, true) => CoverageStatus::Ok,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageStatus::Na => "na",
            CoverageStatus::Ok => "ok",
            CoverageStatus::Fail => "fail",
        }
    }
}

impl fmt::Display for CoverageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cell of the coverage matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageCell {
    pub dataset: String,
    pub rule_class: String,
    pub status: CoverageStatus,
    pub tooltip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCoverage {
    pub validated_tables: usize,
    pub total_tables: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCoverage {
    pub applied_rules: usize,
    pub total_rules: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub total_applications: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleApplication {
    pub rule_id: String,
    pub applications: usize,
}

/// The aggregated view handed to report renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub datasets: Vec<String>,
    pub rules_formal: Vec<String>,
    /// Dataset-major, both axes sorted
    pub cells: Vec<CoverageCell>,
    pub custom_checks: BTreeMap<String, Vec<String>>,
    pub sanity_checks: BTreeMap<String, Vec<String>>,
    pub table_coverage: TableCoverage,
    pub rule_coverage: RuleCoverage,
    pub validation_results: ValidationStats,
    pub rule_application_stats: Vec<RuleApplication>,
    pub missing: Vec<crate::core::ExpectedRule>,
}

impl CoverageReport {
    /// Builds the report from collected results.
    ///
    /// `registry` supplies formal rule classes when no formal result exists
    /// yet and widens the set of known rule classes. `total_tables` of zero
    /// means unknown and yields 0% table coverage.
    pub fn build(
        collected: &CollectedResults,
        registry: Option<&Registry>,
        total_tables: u64,
    ) -> Self {
        let items = &collected.items;
        let rules_formal = formal_classes(collected, registry);

        let mut statuses: BTreeMap<(&str, &str), Vec<&RuleResult>> = BTreeMap::new();
        for item in items.iter().filter(|r| r.kind == RuleKind::Formal) {
            statuses
                .entry((item.dataset(), class_of(item)))
                .or_default()
                .push(item);
        }

        let cells = collected
            .datasets
            .iter()
            .flat_map(|dataset| {
                rules_formal.iter().map(|class| {
                    let results = statuses
                        .get(&(dataset.as_str(), class.as_str()))
                        .map(Vec::as_slice)
                        .unwrap_or_default();
                    build_cell(dataset, class, results)
                })
            })
            .collect();

        let successful = items.iter().filter(|r| r.success).count();
        let total_applications = items.len();

        let applied: BTreeSet<&str> = items.iter().map(class_of).collect();
        let mut known: BTreeSet<String> = applied.iter().map(|c| c.to_string()).collect();
        known.extend(
            collected
                .expected
                .iter()
                .map(|e| class_or_id(&e.rule_class, &e.rule_id).to_string()),
        );
        if let Some(registry) = registry {
            known.extend(registry.rule_classes(None));
        }

        let mut applications: BTreeMap<&str, usize> = BTreeMap::new();
        for item in items {
            *applications.entry(item.rule_id.as_str()).or_default() += 1;
        }

        Self {
            datasets: collected.datasets.clone(),
            cells,
            custom_checks: checks_by_dataset(items, RuleKind::Custom),
            sanity_checks: checks_by_dataset(items, RuleKind::Sanity),
            table_coverage: TableCoverage {
                validated_tables: collected.datasets.len(),
                total_tables,
                percentage: percentage(collected.datasets.len() as f64, total_tables as f64),
            },
            rule_coverage: RuleCoverage {
                applied_rules: applied.len(),
                total_rules: known.len(),
                percentage: percentage(applied.len() as f64, known.len() as f64),
            },
            validation_results: ValidationStats {
                total_applications,
                successful,
                failed: total_applications - successful,
                success_rate: percentage(successful as f64, total_applications as f64),
            },
            rule_application_stats: applications
                .into_iter()
                .map(|(rule_id, applications)| RuleApplication {
                    rule_id: rule_id.to_string(),
                    applications,
                })
                .collect(),
            missing: collected.missing.clone(),
            rules_formal: rules_formal.into_iter().collect(),
        }
    }

    /// Returns the cell for a pair, if both axes are present.
    pub fn cell(&self, dataset: &str, rule_class: &str) -> Option<&CoverageCell> {
        self.cells
            .iter()
            .find(|c| c.dataset == dataset && c.rule_class == rule_class)
    }
}

fn formal_classes(collected: &CollectedResults, registry: Option<&Registry>) -> BTreeSet<String> {
    let from_results: BTreeSet<String> = collected
        .items
        .iter()
        .filter(|r| r.kind == RuleKind::Formal)
        .map(|r| class_of(r).to_string())
        .collect();
    if !from_results.is_empty() {
        return from_results;
    }

    let from_registry = registry
        .map(|r| r.rule_classes(Some(RuleKind::Formal)))
        .unwrap_or_default();
    if !from_registry.is_empty() {
        return from_registry;
    }

    collected
        .expected
        .iter()
        .filter(|e| e.kind == RuleKind::Formal)
        .map(|e| class_or_id(&e.rule_class, &e.rule_id).to_string())
        .collect()
}

fn build_cell(dataset: &str, class: &str, results: &[&RuleResult]) -> CoverageCell {
    let status = results
        .iter()
        .fold(CoverageStatus::Na, |status, r| status.merge(r.success));
    let failures: Vec<&&RuleResult> = results.iter().filter(|r| !r.success).collect();

    let tooltip = match status {
        CoverageStatus::Na => format!("{class} not applied to {dataset}"),
        CoverageStatus::Ok => format!("{class} on {dataset}: {} passed", results.len()),
        CoverageStatus::Fail => {
            let first = failures.first().map(|r| r.message.as_str()).unwrap_or_default();
            format!(
                "{class} on {dataset}: {} of {} failed: {first}",
                failures.len(),
                results.len()
            )
        }
    };

    CoverageCell {
        dataset: dataset.to_string(),
        rule_class: class.to_string(),
        status,
        tooltip,
    }
}

fn checks_by_dataset(items: &[RuleResult], kind: RuleKind) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for item in items.iter().filter(|r| r.kind == kind) {
        map.entry(item.dataset().to_string())
            .or_default()
            .insert(item.rule_id.clone());
    }
    map.into_iter()
        .map(|(dataset, ids)| (dataset, ids.into_iter().collect()))
        .collect()
}

/// The class a result is bucketed under; results without one use their id.
fn class_of(result: &RuleResult) -> &str {
    class_or_id(&result.rule_class, &result.rule_id)
}

fn class_or_id<'a>(class: &'a str, rule_id: &'a str) -> &'a str {
    if class.is_empty() {
        rule_id
    } else {
        class
    }
}

/// `part / whole * 100` rounded to one decimal, 0 when `whole` is 0.
fn percentage(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        return 0.0;
    }
    (part / whole * 1000.0).round() / 10.0
}
