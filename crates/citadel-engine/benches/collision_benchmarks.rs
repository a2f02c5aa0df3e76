//! Broad- and narrow-phase benchmarks.
//!
//! The kernel targets hundreds of live bodies at 60 Hz, so one full
//! collision tick at 500 bodies should stay well inside a 16.67ms frame.
//!
//! Run with: `cargo bench --bench collision_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use citadel_engine::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Engine with `walls` static boxes and `units` moving circles scattered
/// over the middle of the default world.
fn setup_field(units: usize, walls: usize) -> EngineEcs {
    let mut rng = Pcg64::seed_from_u64(0xBE7C);
    let mut ecs = EngineEcs::new(EngineConfig {
        max_instances: units + walls,
        ..EngineConfig::default()
    })
    .unwrap();
    ecs.register_motion().unwrap();
    ecs.register_collision().unwrap();

    for _ in 0..walls {
        let t = Transform::on_ground(rng.gen_range(-120.0..120.0), rng.gen_range(-120.0..120.0));
        let h = ecs.create_instance(t, Aabb::from_half_extents(Vec3::splat(3.0))).unwrap();
        ecs.create_component(h, Collider::fixed(Shape::rect(Vec2::new(3.0, 1.0))))
            .unwrap();
    }
    for _ in 0..units {
        let t = Transform::on_ground(rng.gen_range(-120.0..120.0), rng.gen_range(-120.0..120.0));
        let h = ecs.create_instance(t, Aabb::from_half_extents(Vec3::splat(0.5))).unwrap();
        ecs.create_component(h, Collider::dynamic(Shape::circle(0.5))).unwrap();
        let v = Vec2::new(rng.gen_range(-6.0..6.0), rng.gen_range(-6.0..6.0));
        ecs.create_component(h, Velocity(v)).unwrap();
    }
    ecs
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_grid_update_and_query(c: &mut Criterion) {
    let mut rng = Pcg64::seed_from_u64(7);
    let world = Aabb::new(Vec3::splat(-256.0), Vec3::splat(256.0));
    let mut grid = SpatialGrid::new(UVec2::new(64, 64), world);
    let points: Vec<Vec3> = (0..1000)
        .map(|_| Vec3::new(rng.gen_range(-250.0..250.0), 0.0, rng.gen_range(-250.0..250.0)))
        .collect();
    for (i, p) in points.iter().enumerate() {
        grid.add_instance(InstanceHandle::new(i as u32, 0), *p, Aabb::from_half_extents(Vec3::splat(1.0)));
    }

    c.bench_function("grid_move_1k", |b| {
        let mut offset = 0.0f32;
        b.iter(|| {
            offset = if offset > 0.0 { -0.75 } else { 0.75 };
            for (i, p) in points.iter().enumerate() {
                grid.update_instance(InstanceHandle::new(i as u32, 0), *p + Vec3::X * offset, None);
            }
        });
    });

    let mut out = Vec::new();
    c.bench_function("grid_query_1k", |b| {
        b.iter(|| {
            let mut total = 0;
            for p in &points {
                grid.find_near_into(*p, Vec3::splat(-4.0), Vec3::splat(4.0), &mut out);
                total += out.len();
            }
            black_box(total)
        });
    });
}

fn bench_minimal_push(c: &mut Criterion) {
    let rect = Shape::rect(Vec2::new(2.0, 1.0))
        .to_world(&Transform::on_ground(0.0, 0.0).with_rotation(Quat::from_rotation_y(0.6)));
    let circle = Shape::circle(0.75).to_world(&Transform::on_ground(1.5, 0.4));
    let other = Shape::rect(Vec2::ONE).to_world(&Transform::on_ground(1.0, 1.0));

    c.bench_function("push_box_circle", |b| {
        b.iter(|| minimal_push(black_box(&circle), black_box(&rect)))
    });
    c.bench_function("push_box_box", |b| {
        b.iter(|| minimal_push(black_box(&other), black_box(&rect)))
    });
}

fn bench_engine_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_tick");
    for &units in &[100usize, 250, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(units), &units, |b, &units| {
            let mut ecs = setup_field(units, units / 10);
            b.iter(|| black_box(ecs.tick()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_grid_update_and_query,
    bench_minimal_push,
    bench_engine_tick
);
criterion_main!(benches);
