//! Data source abstraction used by every rule.
//!
//! Rules never talk to a database directly. They go through a
//! [`DataSource`], which exposes two primitives: fetch one aggregate row, or
//! fetch a whole result set. [`DataFusionSource`] is the production adapter
//! and [`ResilientSource`] layers retries and circuit breakers on top of any
//! source.

use crate::core::Params;
use crate::error::DataResult;
use async_trait::async_trait;
use std::fmt::Debug;

mod datafusion;
mod resilient;

pub use crate::core::Row;
pub use self::datafusion::DataFusionSource;
pub use resilient::ResilientSource;

/// A queryable data source shared by all rules of a run.
///
/// Implementations must be safe to call from many rules concurrently.
///
/// # Examples
///
/// ```rust,ignore
/// use term_rules::core::Params;
/// use term_rules::sources::{DataFusionSource, DataSource};
///
/// # async fn example(source: DataFusionSource) -> term_rules::error::DataResult<()> {
/// let row = source
///     .fetch_one(
///         "SELECT COUNT(*) AS n FROM grid.bus WHERE scn_name = :scenario",
///         &Params::new().with("scenario", "eGon2035"),
///     )
///     .await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait DataSource: Debug + Send + Sync {
    /// Runs a query and returns its first row, or an empty row if there is none.
    async fn fetch_one(&self, query: &str, params: &Params) -> DataResult<Row>;

    /// Runs a query and returns every row.
    async fn fetch_all(&self, query: &str, params: &Params) -> DataResult<Vec<Row>>;

    /// Returns a human-readable description of this data source.
    fn description(&self) -> String;
}
