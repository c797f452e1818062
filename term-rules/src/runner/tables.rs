//! Database table discovery for table coverage.

use crate::core::{Params, RowExt};
use crate::sources::DataSource;
use tracing::{debug, warn};

/// Runs a catalog count query and returns the table count.
///
/// Reads the `total_tables` column, falling back to the first numeric
/// column. Any failure yields 0 so an unreachable database never blocks a
/// run.
pub async fn probe_total_tables(source: &dyn DataSource, query: &str) -> u64 {
    match source.fetch_one(query, &Params::new()).await {
        Ok(row) => {
            let count = row
                .get_i64("total_tables")
                .or_else(|| row.keys().find_map(|key| row.get_i64(key)))
                .unwrap_or(0);
            debug!(total_tables = count, "Probed database table count");
            u64::try_from(count).unwrap_or(0)
        }
        Err(e) => {
            warn!(error = %e, "Could not count database tables, assuming 0");
            0
        }
    }
}
