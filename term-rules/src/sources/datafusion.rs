//! DataFusion-backed data source.

use super::{DataSource, Row};
use crate::core::Params;
use crate::error::{DataError, DataResult};
use crate::logging::truncate_field;
use crate::security::SqlSecurity;
use arrow::json::ArrayWriter;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::error::DataFusionError;
use datafusion::prelude::SessionContext;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

const MAX_LOGGED_QUERY: usize = 256;

/// A [`DataSource`] that runs SQL through a DataFusion [`SessionContext`].
///
/// Any table provider registered with the context is queryable, so the same
/// source serves in-memory tables in tests and external tables in
/// production.
///
/// Named parameters written as `:name` are substituted as SQL literals
/// before planning. Strings are quoted and escaped, arrays expand to a
/// comma-separated literal list for use inside `IN (...)`.
///
/// # Examples
///
/// ```rust,no_run
/// use datafusion::prelude::SessionContext;
/// use term_rules::sources::DataFusionSource;
/// use std::time::Duration;
///
/// let source = DataFusionSource::new(SessionContext::new())
///     .with_name("egon-data")
///     .with_query_timeout(Duration::from_secs(300));
/// ```
#[derive(Clone)]
pub struct DataFusionSource {
    ctx: SessionContext,
    name: String,
    query_timeout: Option<Duration>,
}

impl DataFusionSource {
    /// Wraps an existing session context.
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            name: "datafusion".to_string(),
            query_timeout: None,
        }
    }

    /// Sets the name used in logs and descriptions.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Bounds the wall time of each query.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Returns the underlying session context.
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    async fn run(&self, query: &str, params: &Params) -> DataResult<Vec<Row>> {
        let sql = bind_params(query, params)?;
        debug!(
            source = %self.name,
            query = %truncate_field(&sql, MAX_LOGGED_QUERY),
            "Executing query"
        );

        let execute = async {
            let df = self
                .ctx
                .sql(&sql)
                .await
                .map_err(|e| DataError::query(e.to_string()))?;
            df.collect().await.map_err(classify_execution_error)
        };

        let batches = match self.query_timeout {
            Some(limit) => tokio::time::timeout(limit, execute).await.map_err(|_| {
                DataError::timeout(format!("query exceeded {:.1}s", limit.as_secs_f64()))
            })??,
            None => execute.await?,
        };

        batches_to_rows(&batches)
    }
}

impl fmt::Debug for DataFusionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFusionSource")
            .field("name", &self.name)
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DataSource for DataFusionSource {
    #[instrument(skip(self, query, params), fields(source = %self.name))]
    async fn fetch_one(&self, query: &str, params: &Params) -> DataResult<Row> {
        Ok(self
            .run(query, params)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    #[instrument(skip(self, query, params), fields(source = %self.name))]
    async fn fetch_all(&self, query: &str, params: &Params) -> DataResult<Vec<Row>> {
        self.run(query, params).await
    }

    fn description(&self) -> String {
        format!("DataFusion source '{}'", self.name)
    }
}

/// Maps an execution-time failure onto a data error kind.
fn classify_execution_error(err: DataFusionError) -> DataError {
    match err {
        DataFusionError::IoError(e) => DataError::connection(e.to_string()),
        DataFusionError::ObjectStore(e) => DataError::connection(e.to_string()),
        DataFusionError::Plan(msg) => DataError::query(msg),
        other => DataError::operational(other.to_string()),
    }
}

/// Converts record batches to JSON object rows. NULL columns are omitted.
fn batches_to_rows(batches: &[RecordBatch]) -> DataResult<Vec<Row>> {
    let mut writer = ArrayWriter::new(Vec::new());
    let refs: Vec<&RecordBatch> = batches.iter().collect();
    writer
        .write_batches(&refs)
        .map_err(|e| DataError::operational(format!("failed to encode result rows: {e}")))?;
    writer
        .finish()
        .map_err(|e| DataError::operational(format!("failed to encode result rows: {e}")))?;

    let buffer = writer.into_inner();
    if buffer.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&buffer)
        .map_err(|e| DataError::operational(format!("failed to decode result rows: {e}")))
}

/// Substitutes `:name` placeholders with SQL literals.
///
/// Placeholders inside single-quoted strings and `::` casts are left alone.
pub(crate) fn bind_params(query: &str, params: &Params) -> DataResult<String> {
    if params.is_empty() {
        return Ok(query.to_string());
    }

    let chars: Vec<char> = query.chars().collect();
    let mut out = String::with_capacity(query.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            in_string = !in_string;
            out.push(c);
            i += 1;
            continue;
        }

        let is_placeholder = !in_string
            && c == ':'
            && chars.get(i + 1).is_some_and(|n| n.is_ascii_alphabetic() || *n == '_')
            && (i == 0 || chars[i - 1] != ':');

        if !is_placeholder {
            out.push(c);
            i += 1;
            continue;
        }

        let start = i + 1;
        let mut end = start;
        while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
        let name: String = chars[start..end].iter().collect();
        let value = params
            .get(&name)
            .ok_or_else(|| DataError::query(format!("missing bind parameter ':{name}'")))?;
        out.push_str(&render_literal(value));
        i = end;
    }

    Ok(out)
}

fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => SqlSecurity::quote_literal(s),
        Value::Array(items) => items
            .iter()
            .map(render_literal)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => SqlSecurity::quote_literal(&value.to_string()),
    }
}
