//! Property tests for the spatial grid.
//!
//! A plain list of live records serves as the model. After every operation a
//! random query must return every live instance whose ground bound overlaps
//! the query box (no false negatives), each at most once, and never a removed
//! one.

use std::collections::{HashMap, HashSet};

use citadel_engine::prelude::*;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum GridOp {
    Add(u32, Vec3, Vec3),
    Move(u32, Vec3),
    Resize(u32, Vec3),
    Remove(u32),
}

fn arb_point() -> impl Strategy<Value = Vec3> {
    // Reaches past the world bounds so clamping is exercised.
    (-70.0f32..70.0, -70.0f32..70.0).prop_map(|(x, z)| Vec3::new(x, 0.0, z))
}

fn arb_half() -> impl Strategy<Value = Vec3> {
    (0.0f32..12.0, 0.0f32..12.0).prop_map(|(x, z)| Vec3::new(x, 1.0, z))
}

fn arb_op() -> impl Strategy<Value = GridOp> {
    prop_oneof![
        3 => (0..24u32, arb_point(), arb_half()).prop_map(|(i, p, h)| GridOp::Add(i, p, h)),
        3 => (0..24u32, arb_point()).prop_map(|(i, p)| GridOp::Move(i, p)),
        1 => (0..24u32, arb_half()).prop_map(|(i, h)| GridOp::Resize(i, h)),
        2 => (0..24u32).prop_map(GridOp::Remove),
    ]
}

fn world() -> Aabb {
    Aabb::new(Vec3::new(-50.0, -10.0, -50.0), Vec3::new(50.0, 10.0, 50.0))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn queries_are_conservative_and_unique(
        cells in (1u32..12, 1u32..12),
        ops in prop::collection::vec(arb_op(), 1..60),
        queries in prop::collection::vec((arb_point(), arb_half()), 1..8),
    ) {
        let mut grid = SpatialGrid::new(UVec2::new(cells.0, cells.1), world());
        let mut model: HashMap<u32, (Vec3, Aabb)> = HashMap::new();

        for op in ops {
            match op {
                GridOp::Add(i, p, half) => {
                    let bound = Aabb::from_half_extents(half);
                    grid.add_instance(InstanceHandle::new(i, 0), p, bound);
                    model.insert(i, (p, bound));
                }
                GridOp::Move(i, p) => {
                    grid.update_instance(InstanceHandle::new(i, 0), p, None);
                    if let Some(entry) = model.get_mut(&i) {
                        entry.0 = p;
                    }
                }
                GridOp::Resize(i, half) => {
                    if let Some(entry) = model.get_mut(&i) {
                        entry.1 = Aabb::from_half_extents(half);
                        grid.update_instance(InstanceHandle::new(i, 0), entry.0, Some(entry.1));
                    }
                }
                GridOp::Remove(i) => {
                    prop_assert_eq!(grid.remove_instance(InstanceHandle::new(i, 0)), model.remove(&i).is_some());
                }
            }

            prop_assert_eq!(grid.len(), model.len());
            let expected_entries: u32 = model
                .keys()
                .map(|&i| grid.cell_range(InstanceHandle::new(i, 0)).map_or(0, |r| r.cell_count()))
                .sum();
            prop_assert_eq!(grid.entry_count(), expected_entries as usize);

            for (center, half) in &queries {
                let found = grid.find_near(*center, -*half, *half);
                let unique: HashSet<_> = found.iter().copied().collect();
                prop_assert_eq!(unique.len(), found.len(), "duplicate handle in query result");

                let query = Aabb::new(*center - *half, *center + *half);
                for (&i, (p, bound)) in &model {
                    if bound.translated(*p).overlaps_ground(&query) {
                        prop_assert!(
                            unique.contains(&InstanceHandle::new(i, 0)),
                            "instance {} at {:?} missed by query {:?}", i, p, query
                        );
                    }
                }
                for handle in &found {
                    prop_assert!(model.contains_key(&handle.index()), "stale handle {}", handle);
                }
            }
        }
    }
}

#[test]
fn tiny_grid_degenerates_to_a_single_bucket() {
    let mut grid = SpatialGrid::new(UVec2::ZERO, world());
    assert_eq!(grid.cells(), UVec2::ONE);
    for i in 0..5 {
        grid.add_instance(InstanceHandle::new(i, 0), Vec3::new(i as f32 * 20.0 - 40.0, 0.0, 0.0), Aabb::point());
    }
    let found = grid.find_near(Vec3::ZERO, Vec3::splat(-1.0), Vec3::splat(1.0));
    assert_eq!(found.len(), 5);
}
