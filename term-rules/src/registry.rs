//! Rule registry.
//!
//! The registry maps tasks to rule implementations bound to tables. It is
//! an ordinary value owned by the caller: build it at startup, wrap it in an
//! `Arc`, and hand it to the [`TaskRunner`](crate::runner::TaskRunner) and
//! the [`Aggregator`](crate::aggregation::Aggregator).
//!
//! # Examples
//!
//! ```rust
//! use term_rules::checks::{NotNullCheck, RowCountCheck};
//! use term_rules::core::{Params, RuleKind};
//! use term_rules::registry::{CheckFactory, Registration, Registry};
//!
//! let mut registry = Registry::new();
//! registry
//!     .register(
//!         Registration::new("grid", "grid.egon_mv_grid_district")
//!             .with_rule_id("MV_GRID_DISTRICT_COUNT")
//!             .with_params(Params::new().with("expected_count", 3854)),
//!         CheckFactory::row::<RowCountCheck>(),
//!     )
//!     .unwrap();
//!
//! registry
//!     .register_many(
//!         "grid",
//!         CheckFactory::row::<NotNullCheck>(),
//!         None,
//!         RuleKind::Formal,
//!         [
//!             ("grid.egon_etrago_bus", Params::new().with("column", "v_nom")),
//!             ("grid.egon_etrago_line", Params::new().with("column", "s_nom")),
//!         ],
//!     )
//!     .unwrap();
//!
//! let rules = registry.rules_for("grid");
//! assert_eq!(rules.len(), 3);
//! assert_eq!(rules[1].rule_id(), "NotNullCheck");
//! assert!(registry.rules_for("unknown").is_empty());
//! ```

use crate::core::{CustomCheck, Params, RowCheck, Rule, RuleBody, RuleKind, TableRef, TabularCheck};
use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type BuildFn = dyn Fn() -> RuleBody + Send + Sync;

/// Builds a fresh [`RuleBody`] for every rule instance.
#[derive(Clone)]
pub struct CheckFactory {
    rule_class: String,
    build: Arc<BuildFn>,
}

impl CheckFactory {
    /// Factory for a row check built with `T::default()`.
    pub fn row<T: RowCheck + Default + 'static>() -> Self {
        Self::from_fn(short_type_name::<T>(), || RuleBody::Row(Box::new(T::default())))
    }

    /// Factory for a tabular check built with `T::default()`.
    pub fn tabular<T: TabularCheck + Default + 'static>() -> Self {
        Self::from_fn(short_type_name::<T>(), || {
            RuleBody::Tabular(Box::new(T::default()))
        })
    }

    /// Factory for a custom check built with `T::default()`.
    pub fn custom<T: CustomCheck + Default + 'static>() -> Self {
        Self::from_fn(short_type_name::<T>(), || RuleBody::Custom(Box::new(T::default())))
    }

    /// Factory from a closure.
    pub fn from_fn<F>(rule_class: impl Into<String>, build: F) -> Self
    where
        F: Fn() -> RuleBody + Send + Sync + 'static,
    {
        Self {
            rule_class: rule_class.into(),
            build: Arc::new(build),
        }
    }

    /// Returns the implementation name.
    pub fn rule_class(&self) -> &str {
        &self.rule_class
    }

    /// Builds a new rule body.
    pub fn build(&self) -> RuleBody {
        (self.build)()
    }
}

impl fmt::Debug for CheckFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckFactory")
            .field("rule_class", &self.rule_class)
            .finish_non_exhaustive()
    }
}

/// Returns the last path segment of a type name, without generics.
fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Where and how one implementation is registered.
#[derive(Debug, Clone)]
pub struct Registration {
    task: String,
    table: String,
    rule_id: Option<String>,
    kind: RuleKind,
    params: Params,
}

impl Registration {
    pub fn new(task: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            table: table.into(),
            rule_id: None,
            kind: RuleKind::Formal,
            params: Params::new(),
        }
    }

    /// Sets the rule id. Defaults to the implementation name.
    pub fn with_rule_id(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn with_kind(mut self, kind: RuleKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the default parameters every rule instance starts with.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

/// One registered rule.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub rule_id: String,
    pub task: String,
    pub table: TableRef,
    pub rule_class: String,
    pub default_params: Params,
    pub kind: RuleKind,
    factory: CheckFactory,
}

impl RegistryEntry {
    /// Builds a fresh rule from this entry.
    pub fn instantiate(&self) -> Rule {
        Rule::from_parts(
            self.rule_id.clone(),
            self.task.clone(),
            self.table.clone(),
            self.kind,
            self.rule_class.clone(),
            self.default_params.clone(),
            self.factory.build(),
        )
    }

    /// Returns the serializable view of this entry.
    pub fn snapshot(&self) -> RegistryEntrySnapshot {
        RegistryEntrySnapshot {
            rule_id: self.rule_id.clone(),
            task: self.task.clone(),
            table: self.table.qualified(),
            rule_class: self.rule_class.clone(),
            default_params: self.default_params.clone(),
            kind: self.kind,
        }
    }
}

/// Serializable view of a registry entry, without its factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntrySnapshot {
    pub rule_id: String,
    pub task: String,
    pub table: String,
    pub rule_class: String,
    pub default_params: Params,
    pub kind: RuleKind,
}

/// Append-only collection of registered rules.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one implementation on one table.
    pub fn register(
        &mut self,
        registration: Registration,
        factory: CheckFactory,
    ) -> Result<(), RegistryError> {
        let entry = self.entry(registration, &factory)?;
        self.ensure_unique(&entry.task, &entry.rule_id, &entry.table)?;
        debug!(
            rule.id = %entry.rule_id,
            rule.task = %entry.task,
            rule.table = %entry.table,
            rule.class = %entry.rule_class,
            "Registered rule"
        );
        self.entries.push(entry);
        Ok(())
    }

    /// Registers one implementation over many tables.
    ///
    /// Either every table is registered or none is. Returns the number of
    /// entries added.
    pub fn register_many<I, S>(
        &mut self,
        task: &str,
        factory: CheckFactory,
        rule_id: Option<&str>,
        kind: RuleKind,
        tables: I,
    ) -> Result<usize, RegistryError>
    where
        I: IntoIterator<Item = (S, Params)>,
        S: AsRef<str>,
    {
        let mut batch = Vec::new();
        let mut seen = HashSet::new();

        for (table, params) in tables {
            let mut registration = Registration::new(task, table.as_ref())
                .with_kind(kind)
                .with_params(params);
            if let Some(id) = rule_id {
                registration = registration.with_rule_id(id);
            }
            let entry = self.entry(registration, &factory)?;
            self.ensure_unique(&entry.task, &entry.rule_id, &entry.table)?;
            if !seen.insert(entry.table.clone()) {
                return Err(duplicate(&entry.task, &entry.rule_id, &entry.table));
            }
            batch.push(entry);
        }

        let added = batch.len();
        debug!(
            rule.task = task,
            rule.class = %factory.rule_class(),
            count = added,
            "Registered rule over tables"
        );
        self.entries.extend(batch);
        Ok(added)
    }

    /// Builds fresh rules for a task, in registration order.
    ///
    /// Returns an empty vector when nothing is registered for the task.
    pub fn rules_for(&self, task: &str) -> Vec<Rule> {
        self.entries
            .iter()
            .filter(|entry| entry.task == task)
            .map(RegistryEntry::instantiate)
            .collect()
    }

    /// Returns a snapshot of every entry.
    pub fn list_registered(&self) -> Vec<RegistryEntrySnapshot> {
        self.entries.iter().map(RegistryEntry::snapshot).collect()
    }

    /// Returns the distinct task names in first-registration order.
    pub fn tasks(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|entry| seen.insert(entry.task.as_str()))
            .map(|entry| entry.task.clone())
            .collect()
    }

    /// Returns the distinct implementation names of the given kind.
    pub fn rule_classes(&self, kind: Option<RuleKind>) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|entry| kind.map_or(true, |k| entry.kind == k))
            .map(|entry| entry.rule_class.clone())
            .collect()
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(
        &self,
        registration: Registration,
        factory: &CheckFactory,
    ) -> Result<RegistryEntry, RegistryError> {
        let table = TableRef::parse(&registration.table)?;
        Ok(RegistryEntry {
            rule_id: registration
                .rule_id
                .unwrap_or_else(|| factory.rule_class().to_string()),
            task: registration.task,
            table,
            rule_class: factory.rule_class().to_string(),
            default_params: registration.params,
            kind: registration.kind,
            factory: factory.clone(),
        })
    }

    fn ensure_unique(
        &self,
        task: &str,
        rule_id: &str,
        table: &TableRef,
    ) -> Result<(), RegistryError> {
        let exists = self
            .entries
            .iter()
            .any(|e| e.task == task && e.rule_id == rule_id && &e.table == table);
        if exists {
            Err(duplicate(task, rule_id, table))
        } else {
            Ok(())
        }
    }
}

fn duplicate(task: &str, rule_id: &str, table: &TableRef) -> RegistryError {
    RegistryError::Duplicate {
        task: task.to_string(),
        rule_id: rule_id.to_string(),
        table: table.qualified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Row, RowExt, RuleResult, RunContext};
    use crate::error::RuleOutcome;

    #[derive(Default)]
    struct DemoCheck;

    impl RowCheck for DemoCheck {
        fn build_query(&self, rule: &Rule, _ctx: &RunContext) -> RuleOutcome<String> {
            Ok(format!("SELECT COUNT(*) AS n FROM {}", rule.table()))
        }

        fn postprocess(
            &self,
            rule: &Rule,
            row: &Row,
            _ctx: &RunContext,
        ) -> RuleOutcome<RuleResult> {
            Ok(rule.make_result(row.count("n") > 0, "demo"))
        }
    }

    #[test]
    fn test_rule_id_defaults_to_type_name() {
        let mut registry = Registry::new();
        registry
            .register(Registration::new("adhoc", "grid.bus"), CheckFactory::row::<DemoCheck>())
            .unwrap();

        let rules = registry.rules_for("adhoc");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].rule_id(), "DemoCheck");
        assert_eq!(rules[0].rule_class(), "DemoCheck");
        assert_eq!(rules[0].kind(), RuleKind::Formal);
    }

    #[test]
    fn test_rules_for_builds_fresh_instances_in_order() {
        let mut registry = Registry::new();
        for (id, table) in [("A", "s.t1"), ("B", "s.t2"), ("C", "s.t3")] {
            registry
                .register(
                    Registration::new("adhoc", table).with_rule_id(id),
                    CheckFactory::row::<DemoCheck>(),
                )
                .unwrap();
        }
        registry
            .register(
                Registration::new("other", "s.t1").with_rule_id("A"),
                CheckFactory::row::<DemoCheck>(),
            )
            .unwrap();

        let ids: Vec<_> = registry
            .rules_for("adhoc")
            .iter()
            .map(|r| r.rule_id().to_string())
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(registry.rules_for("adhoc").len(), 3, "nothing is cached");
        assert_eq!(registry.tasks(), vec!["adhoc".to_string(), "other".to_string()]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = Registry::new();
        let registration = Registration::new("adhoc", "grid.bus").with_rule_id("R1");
        registry
            .register(registration.clone(), CheckFactory::row::<DemoCheck>())
            .unwrap();

        let err = registry
            .register(registration, CheckFactory::row::<DemoCheck>())
            .unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_many_is_all_or_nothing() {
        let mut registry = Registry::new();
        let err = registry
            .register_many(
                "adhoc",
                CheckFactory::row::<DemoCheck>(),
                Some("NOT_NULL"),
                RuleKind::Formal,
                [
                    ("grid.bus", Params::new()),
                    ("grid.bus; DROP TABLE x", Params::new()),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTable { .. }));
        assert!(registry.is_empty());

        let added = registry
            .register_many(
                "adhoc",
                CheckFactory::row::<DemoCheck>(),
                Some("NOT_NULL"),
                RuleKind::Custom,
                [
                    ("grid.bus", Params::new().with("column", "v_nom")),
                    ("grid.line", Params::new().with("column", "s_nom")),
                ],
            )
            .unwrap();
        assert_eq!(added, 2);

        let rules = registry.rules_for("adhoc");
        assert!(rules.iter().all(|r| r.rule_id() == "NOT_NULL"));
        assert_eq!(rules[1].params().str("column"), Some("s_nom"));
        assert_eq!(rules[1].kind(), RuleKind::Custom);
    }

    #[test]
    fn test_snapshots_and_classes() {
        let mut registry = Registry::new();
        registry
            .register(
                Registration::new("adhoc", "grid.bus")
                    .with_kind(RuleKind::Sanity)
                    .with_params(Params::new().with("threshold", 0.5)),
                CheckFactory::from_fn("ClosureCheck", || RuleBody::Row(Box::new(DemoCheck))),
            )
            .unwrap();

        let snapshots = registry.list_registered();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].rule_class, "ClosureCheck");
        assert_eq!(snapshots[0].table, "grid.bus");
        let json = serde_json::to_value(&snapshots[0]).unwrap();
        assert_eq!(json["kind"], "sanity");

        assert!(registry.rule_classes(Some(RuleKind::Formal)).is_empty());
        assert_eq!(registry.rule_classes(None).len(), 1);
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<DemoCheck>(), "DemoCheck");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
    }
}
