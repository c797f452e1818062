//! Test helpers shared by unit tests.

use crate::core::{Params, Row};
use crate::error::{DataError, DataResult};
use crate::sources::{DataFusionSource, DataSource};
use async_trait::async_trait;
use datafusion::prelude::SessionContext;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// A data source answering from canned responses and recording every query.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    rows: HashMap<String, Vec<Row>>,
    failing: HashMap<String, DataError>,
    fail_first: Mutex<Option<(u32, DataError)>>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers the empty-table probe for `table`.
    pub fn with_count(self, table: &str, count: i64) -> Self {
        self.with_row(
            &format!("SELECT COUNT(*) AS total_count FROM {table}"),
            serde_json::json!({ "total_count": count }),
        )
    }

    pub fn with_row(self, query: &str, row: Value) -> Self {
        self.with_rows(query, vec![row])
    }

    pub fn with_rows(mut self, query: &str, rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect();
        self.rows.insert(query.to_string(), rows);
        self
    }

    /// Always fails `query` with `err`.
    pub fn with_failure(mut self, query: &str, err: DataError) -> Self {
        self.failing.insert(query.to_string(), err);
        self
    }

    /// Fails the first `n` calls of any query with `err`.
    pub fn fail_first(self, n: u32, err: DataError) -> Self {
        *self.fail_first.lock().unwrap() = Some((n, err));
        self
    }

    /// Returns every query received, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    fn answer(&self, query: &str) -> DataResult<Vec<Row>> {
        self.queries.lock().unwrap().push(query.to_string());

        if let Some((remaining, err)) = self.fail_first.lock().unwrap().as_mut() {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(err.clone());
            }
        }
        if let Some(err) = self.failing.get(query) {
            return Err(err.clone());
        }
        self.rows
            .get(query)
            .cloned()
            .ok_or_else(|| DataError::query(format!("no scripted response for: {query}")))
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    async fn fetch_one(&self, query: &str, _params: &Params) -> DataResult<Row> {
        Ok(self.answer(query)?.into_iter().next().unwrap_or_default())
    }

    async fn fetch_all(&self, query: &str, _params: &Params) -> DataResult<Vec<Row>> {
        self.answer(query)
    }

    fn description(&self) -> String {
        "scripted".to_string()
    }
}

/// Builds a DataFusion source after running the given DDL statements.
pub async fn datafusion_source(statements: &[&str]) -> DataFusionSource {
    let ctx = SessionContext::new();
    for statement in statements {
        ctx.sql(statement).await.unwrap().collect().await.unwrap();
    }
    DataFusionSource::new(ctx).with_name("test")
}

/// DDL for a small grid schema with one populated and one empty table.
pub const GRID_FIXTURE: &[&str] = &[
    "CREATE SCHEMA grid",
    "CREATE TABLE grid.bus AS SELECT column1 AS bus_id, column2 AS v_nom, column3 AS scn_name, column4 AS country \
     FROM (VALUES (1, 110.0, 'eGon2035', 'DE'), (2, 380.0, 'eGon2035', 'DE'), (3, 220.0, 'eGon100RE', 'DE'), (4, NULL, 'eGon100RE', 'DK'))",
    "CREATE TABLE grid.line AS SELECT column1 AS line_id, column2 AS bus0, column3 AS s_nom, column4 AS length \
     FROM (VALUES (10, 1, 100.0, 12.0), (11, 2, 200.0, 25.0), (12, 9, 300.0, 37.0))",
    "CREATE TABLE grid.empty_table (id BIGINT, amount DOUBLE)",
];
