//! # Lifecycle Benchmarks
//!
//! Performance benchmarks for avotrace-core lot operations.
//!
//! Run with: `cargo bench -p avotrace-core`

use avotrace_core::{
    HarvestRecord, Ledger, LotQuery, LotSort, MemoryStore, StageRecord, StepValidator, UserId,
    Viewer, Visibility, export_snapshot, lots_csv,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn harvest() -> StageRecord {
    StageRecord::Harvest(HarvestRecord {
        harvest_date: "2026-03-01".to_string(),
        farmer_id: "F-7".to_string(),
        ..HarvestRecord::default()
    })
}

/// A ledger with `size` lots, every other one past the harvest stage.
fn populated(size: usize) -> (Ledger<MemoryStore>, Viewer) {
    let viewer = Viewer::user(UserId::new("bench").expect("valid"));
    let mut ledger = Ledger::new(MemoryStore::new());
    for i in 0..size {
        let lot = ledger
            .create_lot(&format!("L-{i:06}"), Visibility::Global, &viewer)
            .expect("create");
        if i % 2 == 0 {
            ledger
                .advance_step(lot.id, None, harvest(), &viewer)
                .expect("advance");
        }
    }
    (ledger, viewer)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_create_and_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_and_advance");

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| black_box(populated(size)));
        });
    }

    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let (ledger, viewer) = populated(1);
    let lot = ledger
        .all_lots(&viewer)
        .expect("list")
        .pop()
        .expect("one lot");

    c.bench_function("step_report", |b| {
        b.iter(|| black_box(StepValidator::report(&lot)));
    });
}

fn bench_list_lots(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_lots");
    let query = LotQuery {
        sort: LotSort::Completion,
        descending: true,
        ..LotQuery::default()
    };

    for size in [100, 1000].iter() {
        let (ledger, viewer) = populated(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(ledger.list_lots(&query, &viewer)));
        });
    }

    group.finish();
}

fn bench_exports(c: &mut Criterion) {
    let mut group = c.benchmark_group("exports");

    for size in [100, 1000].iter() {
        let (ledger, viewer) = populated(*size);
        let lots = ledger.all_lots(&viewer).expect("list");

        group.bench_with_input(BenchmarkId::new("snapshot", size), size, |b, _| {
            b.iter(|| black_box(export_snapshot(ledger.store())));
        });
        group.bench_with_input(BenchmarkId::new("lots_csv", size), size, |b, _| {
            b.iter(|| black_box(lots_csv(&lots)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_create_and_advance,
    bench_validate,
    bench_list_lots,
    bench_exports,
);

criterion_main!(benches);
