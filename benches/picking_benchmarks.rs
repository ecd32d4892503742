use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kitchen_fifo::services::{
    compliance::ComplianceScorer,
    freshness::{classify_freshness, FreshnessThresholds},
    picking::PickingAllocator,
    urgency::UrgencyThresholds,
};
use kitchen_fifo::{Batch, Category, FreshnessStatus, StorageClass};
use rust_decimal::Decimal;
use uuid::Uuid;

fn snapshot(size: usize) -> Vec<Batch> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
    (0..size)
        .map(|i| {
            let i = i as i64;
            Batch {
                id: Uuid::new_v4(),
                batch_code: format!("WOR-BENCH-{:04}", i),
                ingredient_name: "Wortel".to_string(),
                category: Category::Vegetable,
                weight: Decimal::new(5 + i % 7, 0),
                unit: "kg".to_string(),
                entry_date: base + Duration::hours(i),
                // interleaved expiries so entry order and expiry order disagree
                expiry_date: (i % 5 != 0).then(|| base + Duration::days(3 + (i * 7) % 11)),
                freshness_status: FreshnessStatus::Green,
                active: i % 13 != 0,
                storage: StorageClass::Refrigerator,
                source: None,
                notes: None,
            }
        })
        .collect()
}

// Benchmark for greedy picking over growing snapshots
fn picking_benchmark(c: &mut Criterion) {
    let allocator = PickingAllocator::new(UrgencyThresholds::default());
    let now = Utc.with_ymd_and_hms(2024, 1, 3, 6, 0, 0).unwrap();
    let mut group = c.benchmark_group("picking");

    for size in [10usize, 100, 1_000].iter() {
        let batches = snapshot(*size);
        let requested = Decimal::new(*size as i64 * 3, 0);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                allocator.pick(
                    black_box(&batches),
                    "Wortel",
                    black_box(requested),
                    "kg",
                    now,
                )
            });
        });
    }

    group.finish();
}

// Benchmark for compliance scoring
fn compliance_benchmark(c: &mut Criterion) {
    let scorer = ComplianceScorer::default();
    let mut group = c.benchmark_group("compliance");

    for size in [10usize, 100, 1_000].iter() {
        let batches = snapshot(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| scorer.score(black_box(&batches)));
        });
    }

    group.finish();
}

fn freshness_benchmark(c: &mut Criterion) {
    let th = FreshnessThresholds::default();
    let entry = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
    let expiry = entry + Duration::days(10);
    let now = entry + Duration::days(6);

    c.bench_function("classify_freshness", |b| {
        b.iter(|| classify_freshness(black_box(entry), black_box(expiry), black_box(now), &th))
    });
}

criterion_group!(
    benches,
    picking_benchmark,
    compliance_benchmark,
    freshness_benchmark
);
criterion_main!(benches);
