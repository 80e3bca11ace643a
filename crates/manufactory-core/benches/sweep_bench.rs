//! Criterion benchmarks for the curing sweep.
//!
//! Two groups: a sweep over a large pending-cell registry where nothing is
//! due yet (the common steady-state case), and a sweep that converts a few
//! thousand due cells in one pass.

use criterion::{Criterion, criterion_group, criterion_main};
use manufactory_core::curing::CuringScheduler;
use manufactory_core::event::EventBus;
use manufactory_core::id::{CellIndex, RegionId};
use manufactory_core::test_utils::*;

/// Register `count` wet cells at ascending ticks so their due ticks spread
/// across the cure window.
fn build_scheduler(count: u32) -> (CuringScheduler, TestGrid, TestHost, EventBus) {
    let registry = concrete_registry();
    let wet = registry.material_id("wet_concrete").unwrap();
    let mut grid = TestGrid::default();
    let mut bus = EventBus::new();
    let mut sched = CuringScheduler::new(RegionId(0));

    for i in 0..count {
        grid.place(CellIndex(i), wet);
        sched.register_wet_cell(i as u64, CellIndex(i), &grid, &registry, &mut bus);
    }
    (sched, grid, TestHost::default(), bus)
}

fn bench_idle_sweep(c: &mut Criterion) {
    let registry = concrete_registry();
    c.bench_function("idle_sweep_10k_pending", |b| {
        let (mut sched, mut grid, mut host, mut bus) = build_scheduler(10_000);
        // Tick 250: a sweep tick, but nothing is due for another ~60k ticks.
        b.iter(|| {
            sched.advance(250, &mut grid, &mut host, &registry, &mut bus);
        });
    });
}

fn bench_due_sweep(c: &mut Criterion) {
    let registry = concrete_registry();
    c.bench_function("due_sweep_5k_conversions", |b| {
        b.iter_with_setup(
            || build_scheduler(5_000),
            |(mut sched, mut grid, mut host, mut bus)| {
                // Far past every due tick: the whole registry converts.
                sched.advance(250_000, &mut grid, &mut host, &registry, &mut bus);
            },
        );
    });
}

criterion_group!(benches, bench_idle_sweep, bench_due_sweep);
criterion_main!(benches);
