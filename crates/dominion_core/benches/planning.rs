//! Planning and battle benchmarks for dominion_core.
//!
//! Run with: `cargo bench -p dominion_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use dominion_core::allocation::run_allocation_pass;
use dominion_core::combat::{run_space_battle, AutoBattleAi};
use dominion_core::ids::{FleetId, PlanetId};
use dominion_core::planning::EmpirePlanner;
use dominion_core::snapshot::WorldSnapshotBuilder;
use dominion_test_utils::fixtures::{sample_world, GARTHOG};

/// Snapshot construction and one planning cycle for the sample empire.
pub fn planning_benchmark(c: &mut Criterion) {
    let world = sample_world();

    c.bench_function("snapshot_build", |b| {
        b.iter(|| black_box(WorldSnapshotBuilder::new(&world).build(GARTHOG)))
    });

    let view = WorldSnapshotBuilder::new(&world).build(GARTHOG).expect("view");
    let planner = EmpirePlanner::for_view(&view);
    c.bench_function("planning_cycle", |b| b.iter(|| black_box(planner.plan(&view))));

    c.bench_function("allocation_pass", |b| {
        b.iter_batched(
            || sample_world(),
            |mut world| {
                let catalog = std::sync::Arc::clone(world.catalog());
                for planet in world.planets_mut() {
                    run_allocation_pass(planet, &catalog);
                }
                world
            },
            BatchSize::SmallInput,
        )
    });
}

/// A full space battle over the sample world.
pub fn battle_benchmark(c: &mut Criterion) {
    let world = sample_world();
    c.bench_function("space_battle", |b| {
        b.iter(|| {
            black_box(run_space_battle(
                &world,
                FleetId(1),
                PlanetId(2),
                7,
                &mut AutoBattleAi::default(),
            ))
        })
    });
}

criterion_group!(benches, planning_benchmark, battle_benchmark);
criterion_main!(benches);
