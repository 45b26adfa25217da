//! Collision and tick benchmarks for realm_core.
//!
//! Run with: `cargo bench -p realm_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use realm_core::collision::{Body, CollisionTuning, Resolver, TickSnapshot};
use realm_core::components::Collider;
use realm_core::config::SimConfig;
use realm_core::geometry::{MapGeometry, MapRegistry, Solid};
use realm_core::instance::Instance;
use realm_core::math::{Aabb, Vec2};

const MAP: &str = "bench";

fn body(id: u64, x: f32, y: f32) -> Body {
    Body {
        id,
        position: Vec2::new(x, y),
        collider: Collider::Circle { radius: 16.0 },
        map_id: MAP.to_string(),
        instance_id: 0,
        alive: true,
    }
}

fn walled_map() -> MapGeometry {
    let mut map = MapGeometry::new(Aabb::from_origin_size(0.0, 0.0, 2048.0, 2048.0));
    for i in 0..16 {
        let x = 100.0 + i as f32 * 120.0;
        map = map.with_solid(Solid::rect(x, 200.0, 8.0, 1600.0));
    }
    map
}

/// Resolve a single move against a crowd of bodies and walls.
pub fn resolve_benchmark(c: &mut Criterion) {
    let tuning = CollisionTuning::default();
    let map = walled_map();
    let mut group = c.benchmark_group("resolve");

    for crowd in [8u64, 64, 256] {
        let bodies: Vec<Body> = (0..crowd)
            .map(|i| body(i + 2, 150.0 + (i % 16) as f32 * 40.0, 150.0 + (i / 16) as f32 * 40.0))
            .chain(std::iter::once(body(1, 60.0, 60.0)))
            .collect();
        let snapshot = TickSnapshot::new(bodies, HashMap::new());
        let mover = body(1, 60.0, 60.0);
        let resolver = Resolver::new(&tuning, Some(&map));

        group.bench_with_input(BenchmarkId::from_parameter(crowd), &snapshot, |b, snap| {
            b.iter(|| {
                resolver.resolve(
                    black_box(&mover),
                    black_box(Vec2::new(400.0, 260.0)),
                    snap,
                    None,
                    0,
                )
            });
        });
    }
    group.finish();
}

/// Advance a populated instance by one second of simulated time.
pub fn instance_benchmark(c: &mut Criterion) {
    let mut maps = MapRegistry::new();
    if let Err(err) = maps.register(MAP, walled_map()) {
        panic!("bench map rejected: {err}");
    }
    let maps = Arc::new(maps);
    let config = Arc::new(SimConfig::default());

    c.bench_function("instance_one_second_64_mobs", |b| {
        b.iter_batched(
            || {
                let mut inst = Instance::new(1, Arc::clone(&config), Arc::clone(&maps));
                inst.spawn_player(MAP, 0, Vec2::new(1024.0, 1024.0));
                for i in 0..64 {
                    let pos = Vec2::new(64.0 + (i % 8) as f32 * 250.0, 64.0 + (i / 8) as f32 * 250.0);
                    let _ = inst.spawn_mob("gablino", MAP, 0, pos);
                }
                inst
            },
            |mut inst| {
                for t in 0..=62 {
                    inst.advance(t * 16);
                }
                black_box(inst.state_hash())
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, resolve_benchmark, instance_benchmark);
criterion_main!(benches);
