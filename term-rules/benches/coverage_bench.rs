//! Benchmarks for building coverage reports from collected results.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use std::hint::black_box;
use term_rules::aggregation::{CollectedResults, CoverageReport};
use term_rules::core::{RuleKind, RuleResult};

const CLASSES: &[&str] = &[
    "NotNullCheck",
    "RangeCheck",
    "RowCountCheck",
    "ValueSetCheck",
    "ReferentialIntegrityCheck",
];

/// Generates results spread over `datasets` tables, 10% of them failing.
fn generate_results(count: usize, datasets: usize) -> Vec<RuleResult> {
    let mut rng = rand::rng();
    (0..count)
        .map(|i| {
            let class = CLASSES[rng.random_range(0..CLASSES.len())];
            let dataset = format!("grid.table_{}", rng.random_range(0..datasets));
            let success = rng.random_range(0..100) >= 10;
            let kind = if i % 20 == 0 {
                RuleKind::Custom
            } else {
                RuleKind::Formal
            };
            RuleResult::new(format!("{class}_{i}"), "bench", dataset, success, "bench")
                .with_rule_class(class)
                .with_kind(kind)
        })
        .collect()
}

fn bench_coverage_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("coverage_build");

    for &(count, datasets) in &[(100, 10), (1_000, 100), (10_000, 500)] {
        let collected = CollectedResults::from_items(generate_results(count, datasets), Vec::new());
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(count),
            &collected,
            |b, collected| b.iter(|| CoverageReport::build(black_box(collected), None, 1_000)),
        );
    }

    group.finish();
}

fn bench_collect_sort(c: &mut Criterion) {
    let results = generate_results(10_000, 500);
    c.bench_function("collected_results_from_items_10k", |b| {
        b.iter_batched(
            || results.clone(),
            |items| CollectedResults::from_items(black_box(items), Vec::new()),
            criterion::BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_coverage_build, bench_collect_sort);
criterion_main!(benches);
