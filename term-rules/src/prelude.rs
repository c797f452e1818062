//! Prelude for commonly used types and traits in term-rules.

pub use crate::aggregation::{Aggregator, CollectedResults, CoverageReport, CoverageStatus};
pub use crate::checks::{
    CorrelationCheck, NotNullCheck, RangeCheck, ReferentialIntegrityCheck, RowCountCheck,
    RowCountComparison, ValueSetCheck,
};
pub use crate::config::EngineConfig;
pub use crate::core::{
    CustomCheck, Params, Row, RowCheck, RowExt, Rule, RuleBody, RuleKind, RuleResult, RunContext,
    Severity, Table, TableRef, TabularCheck,
};
pub use crate::error::{
    DataError, DataErrorKind, ErrorContext, RegistryError, Result, RuleError, RuleOutcome,
    RulesError,
};
pub use crate::logging::LogConfig;
pub use crate::registry::{CheckFactory, Registration, Registry};
pub use crate::repository::ResultRepository;
pub use crate::resilience::{CircuitBreakerConfig, RetryPolicy};
pub use crate::runner::{TaskRunner, TaskSummary};
pub use crate::sources::{DataFusionSource, DataSource, ResilientSource};
