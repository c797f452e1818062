//! Rules, rule bodies and the single execution entry point.

use super::{Params, Row, RowExt, RuleResult, RunContext, Severity, Table};
use crate::error::{RegistryError, RuleOutcome};
use crate::security::SqlSecurity;
use crate::sources::DataSource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Which coverage bucket a rule reports into.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Generic structural rules that form the coverage matrix columns
    #[default]
    Formal,
    /// Dataset-specific rules listed per dataset
    Custom,
    /// Cross-dataset plausibility checks
    Sanity,
}

impl RuleKind {
    /// Returns the string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Formal => "formal",
            RuleKind::Custom => "custom",
            RuleKind::Sanity => "sanity",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "formal" => Ok(RuleKind::Formal),
            "custom" => Ok(RuleKind::Custom),
            "sanity" => Ok(RuleKind::Sanity),
            other => Err(format!("unknown rule kind '{other}'")),
        }
    }
}

/// A validated, optionally schema-qualified table reference.
///
/// # Examples
///
/// ```rust
/// use term_rules::core::TableRef;
///
/// let table = TableRef::parse("grid.egon_mv_grid_district").unwrap();
/// assert_eq!(table.schema(), Some("grid"));
/// assert_eq!(table.name(), "egon_mv_grid_district");
/// assert_eq!(table.to_string(), "grid.egon_mv_grid_district");
///
/// assert!(TableRef::parse("grid.bus; DROP TABLE x").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableRef {
    schema: Option<String>,
    name: String,
}

impl TableRef {
    /// Parses `schema.name` or a bare `name`.
    pub fn parse(reference: &str) -> Result<Self, RegistryError> {
        SqlSecurity::validate_identifier(reference).map_err(|e| RegistryError::InvalidTable {
            table: reference.to_string(),
            reason: e.to_string(),
        })?;

        Ok(match reference.split_once('.') {
            Some((schema, name)) => Self {
                schema: Some(schema.to_string()),
                name: name.to_string(),
            },
            None => Self {
                schema: None,
                name: reference.to_string(),
            },
        })
    }

    /// Returns the schema, if qualified.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Returns the bare table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the reference as written in SQL.
    pub fn qualified(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl TryFrom<String> for TableRef {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TableRef::parse(&value)
    }
}

impl From<TableRef> for String {
    fn from(value: TableRef) -> Self {
        value.to_string()
    }
}

/// A check that reduces its target to a single aggregate row.
pub trait RowCheck: Send + Sync {
    /// Builds the aggregate query for the rule.
    fn build_query(&self, rule: &Rule, ctx: &RunContext) -> RuleOutcome<String>;

    /// Named bind parameters for the query, if any.
    fn query_params(&self, _rule: &Rule, _ctx: &RunContext) -> Params {
        Params::new()
    }

    /// Turns the aggregate row into a result.
    fn postprocess(&self, rule: &Rule, row: &Row, ctx: &RunContext) -> RuleOutcome<RuleResult>;
}

/// A check that evaluates a fully materialized result set.
pub trait TabularCheck: Send + Sync {
    /// Builds the query whose rows are materialized. Defaults to the whole table.
    fn build_query(&self, rule: &Rule, _ctx: &RunContext) -> RuleOutcome<String> {
        Ok(format!("SELECT * FROM {}", rule.table()))
    }

    /// Named bind parameters for the query, if any.
    fn query_params(&self, _rule: &Rule, _ctx: &RunContext) -> Params {
        Params::new()
    }

    /// Evaluates the materialized table. Never called with an empty table.
    fn evaluate_table(
        &self,
        rule: &Rule,
        table: &Table,
        ctx: &RunContext,
    ) -> RuleOutcome<RuleResult>;
}

/// A check that drives data access itself.
#[async_trait]
pub trait CustomCheck: Send + Sync {
    /// Evaluates the rule against the data source.
    async fn evaluate(
        &self,
        rule: &Rule,
        source: &dyn DataSource,
        ctx: &RunContext,
    ) -> RuleOutcome<RuleResult>;
}

/// The body of a rule: one of three closed variants.
pub enum RuleBody {
    Row(Box<dyn RowCheck>),
    Tabular(Box<dyn TabularCheck>),
    Custom(Box<dyn CustomCheck>),
}

impl RuleBody {
    /// Returns the variant name.
    pub fn variant(&self) -> &'static str {
        match self {
            RuleBody::Row(_) => "row",
            RuleBody::Tabular(_) => "tabular",
            RuleBody::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for RuleBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleBody::{}", self.variant())
    }
}

/// A named, parameterized check bound to one table.
///
/// Rules are immutable once built. The registry builds a fresh `Rule` per
/// entry every time a task is resolved; ad hoc rules can be built with
/// [`Rule::inline`].
///
/// # Examples
///
/// ```rust
/// use term_rules::core::{Params, Rule, RuleBody, RuleKind, TableRef};
/// use term_rules::checks::RowCountCheck;
///
/// let rule = Rule::inline(
///     "MV_GRID_DISTRICT_COUNT",
///     "adhoc",
///     TableRef::parse("grid.egon_mv_grid_district").unwrap(),
///     RuleBody::Row(Box::new(RowCountCheck)),
/// )
/// .with_params(Params::new().with("expected_count", 3854))
/// .with_rule_class("RowCountCheck");
///
/// assert_eq!(rule.kind(), RuleKind::Formal);
/// assert_eq!(rule.params().i64("expected_count"), Some(3854));
/// ```
#[derive(Debug)]
pub struct Rule {
    rule_id: String,
    task: String,
    table: TableRef,
    kind: RuleKind,
    rule_class: String,
    params: Params,
    body: RuleBody,
}

impl Rule {
    pub(crate) fn from_parts(
        rule_id: String,
        task: String,
        table: TableRef,
        kind: RuleKind,
        rule_class: String,
        params: Params,
        body: RuleBody,
    ) -> Self {
        Self {
            rule_id,
            task,
            table,
            kind,
            rule_class,
            params,
            body,
        }
    }

    /// Builds an ad hoc rule that is not part of a registry.
    ///
    /// The rule class defaults to the rule id until set explicitly.
    pub fn inline(
        rule_id: impl Into<String>,
        task: impl Into<String>,
        table: TableRef,
        body: RuleBody,
    ) -> Self {
        let rule_id = rule_id.into();
        Self {
            rule_class: rule_id.clone(),
            rule_id,
            task: task.into(),
            table,
            kind: RuleKind::default(),
            params: Params::new(),
            body,
        }
    }

    /// Sets the kind.
    pub fn with_kind(mut self, kind: RuleKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the parameters.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Sets the implementation name.
    pub fn with_rule_class(mut self, rule_class: impl Into<String>) -> Self {
        self.rule_class = rule_class.into();
        self
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn rule_class(&self) -> &str {
        &self.rule_class
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn body(&self) -> &RuleBody {
        &self.body
    }

    /// Builds a result for this rule with severity derived from `success`.
    pub fn make_result(&self, success: bool, message: impl Into<String>) -> RuleResult {
        let mut result = RuleResult::new(
            self.rule_id.clone(),
            self.task.clone(),
            self.table.qualified(),
            success,
            message,
        )
        .with_kind(self.kind)
        .with_rule_class(self.rule_class.clone());
        result.schema = self.table.schema().map(str::to_string);
        result
    }

    /// Builds a failing ERROR result for a rule that could not be evaluated.
    pub fn make_error_result(&self, message: impl Into<String>) -> RuleResult {
        self.make_result(false, message).with_severity(Severity::Error)
    }

    /// Builds the non-fatal result reported when the target table has no rows.
    pub fn make_empty_result(&self) -> RuleResult {
        self.make_result(false, format!("table {} is empty, nothing to validate", self.table))
        .with_observed(0i64)
        .with_expected(">0")
        .with_severity(Severity::Info)
    }

    /// Probes the target table and returns the empty result if it has no rows.
    ///
    /// A failing probe returns `None` so the main query surfaces the real error.
    pub async fn is_target_empty(
        &self,
        source: &dyn DataSource,
        _ctx: &RunContext,
    ) -> Option<RuleResult> {
        let query = format!("SELECT COUNT(*) AS total_count FROM {}", self.table);
        match source.fetch_one(&query, &Params::new()).await {
            Ok(row) if row.count("total_count") == 0 => Some(self.make_empty_result()),
            Ok(_) => None,
            Err(e) => {
                debug!(
                    rule.id = %self.rule_id,
                    rule.table = %self.table,
                    error = %e,
                    "Empty-table probe failed, continuing with main query"
                );
                None
            }
        }
    }

    /// Executes the rule against the data source.
    ///
    /// Row checks run the empty-table guard first and skip their main query
    /// when the target is empty. Tabular checks short-circuit on an empty
    /// result set. Custom checks are called directly.
    pub async fn execute(
        &self,
        source: &dyn DataSource,
        ctx: &RunContext,
    ) -> RuleOutcome<RuleResult> {
        match &self.body {
            RuleBody::Row(check) => {
                if let Some(empty) = self.is_target_empty(source, ctx).await {
                    return Ok(empty);
                }
                let query = check.build_query(self, ctx)?;
                let params = check.query_params(self, ctx);
                let row = source.fetch_one(&query, &params).await?;
                check.postprocess(self, &row, ctx)
            }
            RuleBody::Tabular(check) => {
                let query = check.build_query(self, ctx)?;
                let params = check.query_params(self, ctx);
                let table = Table::new(source.fetch_all(&query, &params).await?);
                if table.is_empty() {
                    return Ok(self.make_empty_result());
                }
                check.evaluate_table(self, &table, ctx)
            }
            RuleBody::Custom(check) => check.evaluate(self, source, ctx).await,
        }
    }
}
