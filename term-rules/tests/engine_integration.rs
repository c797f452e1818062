//! Integration tests for task execution and result persistence.

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use term_rules::error::DataResult;
use term_rules::prelude::*;

fn runner(registry: Registry, ctx: &RunContext, config: EngineConfig) -> TaskRunner {
    TaskRunner::new(
        Arc::new(registry),
        ResultRepository::for_context(ctx),
        config,
    )
}

#[tokio::test]
async fn test_adhoc_task_outcomes() {
    let out = TempDir::new().unwrap();
    let ctx = run_context(out.path(), "adhoc_run");
    let runner = runner(adhoc_registry(), &ctx, EngineConfig::new());

    let summary = runner
        .run_task("adhoc", grid_source().await, &ctx)
        .await
        .unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.passed, 1);

    let by_id = |id: &str| {
        summary
            .results
            .iter()
            .find(|r| r.rule_id == id)
            .unwrap()
            .clone()
    };

    let empty = by_id("EMPTY_NOT_NULL");
    assert!(!empty.success);
    assert_eq!(empty.severity, Severity::Info);
    assert!(empty.message.contains("empty"));
    assert_eq!(empty.observed.as_ref().and_then(|v| v.as_f64()), Some(0.0));

    let count = by_id("BUS_COUNT");
    assert!(count.success);
    assert_eq!(count.rule_class, "RowCountCheck");
    assert!(count.execution_time.is_some());

    let failing = by_id("LINE_CARRIER");
    assert!(!failing.success);
    assert_eq!(failing.severity, Severity::Error);
    assert!(failing.message.contains("lookup table missing column 'carrier'"));
    assert_eq!(failing.kind, RuleKind::Custom);

    let repository = runner.repository();
    let logs = repository.log_files().await.unwrap();
    assert_eq!(logs.len(), 3);
    assert!(repository
        .rule_log_path("adhoc", "BUS_COUNT", "grid.bus")
        .exists());
    assert_eq!(repository.read_manifest("adhoc").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_empty_table_skips_main_query() {
    #[derive(Debug)]
    struct Recording {
        inner: Arc<dyn DataSource>,
        queries: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl DataSource for Recording {
        async fn fetch_one(&self, query: &str, params: &Params) -> DataResult<Row> {
            self.queries.lock().unwrap().push(query.to_string());
            self.inner.fetch_one(query, params).await
        }

        async fn fetch_all(&self, query: &str, params: &Params) -> DataResult<Vec<Row>> {
            self.queries.lock().unwrap().push(query.to_string());
            self.inner.fetch_all(query, params).await
        }

        fn description(&self) -> String {
            "recording".to_string()
        }
    }

    let source = Recording {
        inner: grid_source().await,
        queries: Default::default(),
    };
    let rule = Rule::inline(
        "EMPTY_RANGE",
        "adhoc",
        TableRef::parse("grid.empty_table").unwrap(),
        RuleBody::Row(Box::new(RangeCheck)),
    )
    .with_params(
        Params::new()
            .with("column", "amount")
            .with("min_val", 0.0)
            .with("max_val", 1.0),
    );

    let result = rule.execute(&source, &RunContext::new("run")).await.unwrap();
    assert!(!result.success);
    assert_ne!(result.severity, Severity::Error);
    assert_eq!(result.expected.unwrap().to_string(), ">0");

    let queries = source.queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("total_count"));
}

#[tokio::test]
async fn test_every_rule_yields_one_result() {
    let mut registry = Registry::new();
    let tables = ["grid.bus", "grid.line", "grid.empty_table"];
    for (i, table) in tables.iter().enumerate() {
        registry
            .register(
                Registration::new("mixed", *table).with_rule_id(format!("PANIC_{i}")),
                CheckFactory::custom::<PanickingCheck>(),
            )
            .unwrap();
        registry
            .register(
                Registration::new("mixed", *table).with_rule_id(format!("FAIL_{i}")),
                CheckFactory::custom::<FailingCheck>(),
            )
            .unwrap();
        registry
            .register(
                Registration::new("mixed", *table)
                    .with_rule_id(format!("COUNT_{i}"))
                    .with_params(Params::new().with("expected_count", 3)),
                CheckFactory::row::<RowCountCheck>(),
            )
            .unwrap();
        registry
            .register(
                Registration::new("mixed", *table)
                    .with_rule_id(format!("MISSING_COLUMN_{i}"))
                    .with_params(Params::new().with("column", "no_such_column")),
                CheckFactory::row::<NotNullCheck>(),
            )
            .unwrap();
    }
    let total = registry.len();

    let out = TempDir::new().unwrap();
    let ctx = run_context(out.path(), "mixed_run");
    let runner = runner(registry, &ctx, EngineConfig::new().with_max_workers(3));

    let summary = runner
        .run_task("mixed", grid_source().await, &ctx)
        .await
        .unwrap();
    assert_eq!(summary.total, total);
    assert_eq!(runner.repository().log_files().await.unwrap().len(), total);

    for result in &summary.results {
        if result.rule_id.starts_with("PANIC_") {
            assert_eq!(result.message, "Unexpected error: attempt to divide by zero");
            assert_eq!(result.severity, Severity::Error);
        }
        if result.rule_id == "MISSING_COLUMN_0" {
            assert!(result.message.starts_with("Database error:"), "{}", result.message);
            assert_eq!(result.severity, Severity::Error);
        }
    }
    // grid.line has exactly 3 rows
    assert_eq!(summary.passed, 1);
}

#[tokio::test]
async fn test_rerun_appends_and_latest_wins() {
    let out = TempDir::new().unwrap();
    let ctx = run_context(out.path(), "rerun");
    let runner = runner(adhoc_registry(), &ctx, EngineConfig::new());

    runner.run_task("adhoc", grid_source().await, &ctx).await.unwrap();
    runner.run_task("adhoc", grid_source().await, &ctx).await.unwrap();

    let repository = runner.repository();
    let path = repository.rule_log_path("adhoc", "BUS_COUNT", "grid.bus");
    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 2);

    let collected = Aggregator::new(repository).collect().await.unwrap();
    assert_eq!(collected.len(), 3);
}

#[tokio::test]
async fn test_similar_rule_ids_keep_their_own_results() {
    let mut registry = Registry::new();
    for rule_id in ["BUS COUNT", "BUS_COUNT"] {
        registry
            .register(
                Registration::new("counts", "grid.bus")
                    .with_rule_id(rule_id)
                    .with_params(Params::new().with("expected_count", 4)),
                CheckFactory::row::<RowCountCheck>(),
            )
            .unwrap();
    }

    let out = TempDir::new().unwrap();
    let ctx = run_context(out.path(), "similar_ids");
    let runner = runner(registry, &ctx, EngineConfig::new());

    let summary = runner
        .run_task("counts", grid_source().await, &ctx)
        .await
        .unwrap();
    assert_eq!(summary.total, 2);
    assert_eq!(runner.repository().log_files().await.unwrap().len(), 2);

    let collected = Aggregator::new(runner.repository()).collect().await.unwrap();
    assert_eq!(collected.len(), 2);
    assert!(collected.missing.is_empty(), "{:?}", collected.missing);
}

#[tokio::test]
async fn test_task_timeout() {
    let mut registry = adhoc_registry();
    registry
        .register(
            Registration::new("adhoc", "grid.bus").with_rule_id("STUCK"),
            CheckFactory::custom::<StuckCheck>(),
        )
        .unwrap();

    let out = TempDir::new().unwrap();
    let ctx = run_context(out.path(), "timeout");
    let runner = runner(
        registry,
        &ctx,
        EngineConfig::new().with_task_timeout(Duration::from_millis(500)),
    );

    let err = runner
        .run_task("adhoc", grid_source().await, &ctx)
        .await
        .unwrap_err();
    match err {
        RulesError::TaskTimeout {
            task,
            completed,
            total,
            ..
        } => {
            assert_eq!(task, "adhoc");
            assert_eq!(total, 4);
            assert!(completed < total);
        }
        other => panic!("expected task timeout, got {other}"),
    }
}

#[tokio::test]
async fn test_rule_timeout_yields_error_result() {
    let mut registry = Registry::new();
    registry
        .register(
            Registration::new("slow", "grid.bus").with_rule_id("STUCK"),
            CheckFactory::custom::<StuckCheck>(),
        )
        .unwrap();

    let out = TempDir::new().unwrap();
    let ctx = run_context(out.path(), "rule_timeout");
    let runner = runner(
        registry,
        &ctx,
        EngineConfig::new().with_rule_timeout(Duration::from_millis(100)),
    );

    let summary = runner
        .run_task("slow", grid_source().await, &ctx)
        .await
        .unwrap();
    let result = &summary.results[0];
    assert!(!result.success);
    assert_eq!(result.severity, Severity::Error);
    assert!(result.message.starts_with("Rule execution error: rule timed out"));
}

#[tokio::test]
async fn test_unknown_task() {
    let out = TempDir::new().unwrap();
    let ctx = run_context(out.path(), "unknown");
    let runner = runner(adhoc_registry(), &ctx, EngineConfig::new());

    let err = runner
        .run_task("does_not_exist", grid_source().await, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, RulesError::UnknownTask(task) if task == "does_not_exist"));
    assert!(runner.repository().log_files().await.unwrap().is_empty());
}
