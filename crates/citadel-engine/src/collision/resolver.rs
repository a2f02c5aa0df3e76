//! The [`CollisionResolver`] system.
//!
//! Members are every instance with a [`Collider`]. Each update runs three
//! passes in a fixed order:
//!
//! 1. **Static pass.** Every static body queries the dynamic grid and pushes
//!    overlapping dynamic bodies out of itself. Destructible statics at zero
//!    health are queued for destruction instead. Each hit is recorded.
//! 2. **Second run.** The recorded pairs are tested again after all first-pass
//!    displacements and pushed apart once more. Velocity is left alone and no
//!    event is emitted.
//! 3. **Dynamic pass.** Every dynamic body is pushed out of the dynamic bodies
//!    near it.
//!
//! Instances that die mid-pass are skipped for the rest of the tick.

use std::any::Any;

use citadel_ecs::entity::InstanceHandle;
use citadel_ecs::glam::{Vec2, Vec3};
use citadel_ecs::system::{EntitySet, System};
use citadel_ecs::transform::Aabb;
use citadel_ecs::world::World;

use super::shape::{minimal_push, WorldShape};
use super::{Collider, Destructible, Garrisoned, Velocity};
use crate::config::EngineConfig;
use crate::events::Event;
use crate::facade::EngineEcs;
use crate::spatial::SpatialGrid;

/// Name the resolver is registered under.
pub const COLLISION_SYSTEM_NAME: &str = "collision";

/// Counters for the last update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionStats {
    pub static_hits: usize,
    pub second_run_hits: usize,
    pub dynamic_hits: usize,
    pub destroyed_statics: usize,
}

/// Pushes dynamic colliders out of static and dynamic colliders.
#[derive(Debug)]
pub struct CollisionResolver {
    statics: EntitySet,
    dynamics: EntitySet,
    static_grid: SpatialGrid,
    dynamic_grid: SpatialGrid,
    second_run: Vec<(InstanceHandle, InstanceHandle)>,
    candidates: Vec<InstanceHandle>,
    friction: f32,
    padding: f32,
    stats: CollisionStats,
}

impl CollisionResolver {
    pub fn new(config: &EngineConfig) -> Self {
        let cells = config.collision.grid_cells;
        Self {
            statics: EntitySet::new(),
            dynamics: EntitySet::new(),
            static_grid: SpatialGrid::new(cells, config.world_bounds),
            dynamic_grid: SpatialGrid::new(cells, config.world_bounds),
            second_run: Vec::new(),
            candidates: Vec::new(),
            friction: config.collision.friction,
            padding: config.collision.query_padding,
            stats: CollisionStats::default(),
        }
    }

    pub fn statics(&self) -> &EntitySet {
        &self.statics
    }

    pub fn dynamics(&self) -> &EntitySet {
        &self.dynamics
    }

    pub fn is_static(&self, handle: InstanceHandle) -> bool {
        self.statics.contains(handle)
    }

    pub fn is_dynamic(&self, handle: InstanceHandle) -> bool {
        self.dynamics.contains(handle)
    }

    pub fn stats(&self) -> CollisionStats {
        self.stats
    }

    /// Static bodies whose cells touch the query box, e.g. for placement
    /// checks.
    pub fn find_statics_near(&mut self, translation: Vec3, min_offset: Vec3, max_offset: Vec3) -> Vec<InstanceHandle> {
        self.static_grid.find_near(translation, min_offset, max_offset)
    }

    pub fn find_dynamics_near(&mut self, translation: Vec3, min_offset: Vec3, max_offset: Vec3) -> Vec<InstanceHandle> {
        self.dynamic_grid.find_near(translation, min_offset, max_offset)
    }

    /// Re-grid `handle` after its pose changed outside the resolver.
    ///
    /// Unknown handles and instances without a collider are ignored.
    pub fn instance_moved(&mut self, world: &World, handle: InstanceHandle) {
        let grid = if self.statics.contains(handle) {
            &mut self.static_grid
        } else if self.dynamics.contains(handle) {
            &mut self.dynamic_grid
        } else {
            return;
        };
        if let Some((shape, origin)) = world_shape(world, handle) {
            grid.update_instance(handle, origin, Some(shape.bound_relative_to(origin)));
        }
    }

    fn padded(&self, bound: Aabb) -> (Vec3, Vec3) {
        let pad = Vec3::new(self.padding, 0.0, self.padding);
        (bound.min - pad, bound.max + pad)
    }

    fn refresh_dynamics(&mut self, ctx: &EngineEcs) {
        for handle in self.dynamics.iter() {
            if let Some((shape, origin)) = world_shape(ctx.world(), handle) {
                self.dynamic_grid
                    .update_instance(handle, origin, Some(shape.bound_relative_to(origin)));
            }
        }
    }

    fn static_pass(&mut self, ctx: &mut EngineEcs, dt: f32) {
        let mut candidates = std::mem::take(&mut self.candidates);
        for fixed in self.statics.to_vec() {
            let wrecked = ctx
                .try_get_component::<Destructible>(fixed)
                .is_some_and(|d| d.health <= 0.0);
            if wrecked {
                tracing::debug!(instance = %fixed, "destructible collider at zero health");
                ctx.queue_destroy(fixed);
                self.stats.destroyed_statics += 1;
                continue;
            }
            let Some((fixed_shape, origin)) = world_shape(ctx.world(), fixed) else {
                continue;
            };
            let (min, max) = self.padded(fixed_shape.bound_relative_to(origin));
            self.dynamic_grid.find_near_into(origin, min, max, &mut candidates);

            for &dynamic in &candidates {
                if ctx.test_signature::<Garrisoned>(dynamic) {
                    continue;
                }
                let Some((shape, _)) = world_shape(ctx.world(), dynamic) else {
                    continue;
                };
                let push = minimal_push(&shape, &fixed_shape);
                if push == Vec2::ZERO {
                    continue;
                }
                tracing::trace!(dynamic = %dynamic, fixed = %fixed, ?push, "static collision");
                self.displace(ctx, dynamic, push, false, dt);
                ctx.emit(&Event::StaticCollision { dynamic, fixed, push });
                self.second_run.push((dynamic, fixed));
                self.stats.static_hits += 1;
            }
        }
        self.candidates = candidates;
    }

    fn second_run_pass(&mut self, ctx: &mut EngineEcs, dt: f32) {
        let mut pairs = std::mem::take(&mut self.second_run);
        for &(dynamic, fixed) in &pairs {
            let (Some((shape, _)), Some((fixed_shape, _))) =
                (world_shape(ctx.world(), dynamic), world_shape(ctx.world(), fixed))
            else {
                continue;
            };
            let push = minimal_push(&shape, &fixed_shape);
            if push != Vec2::ZERO {
                self.displace(ctx, dynamic, push, true, dt);
                self.stats.second_run_hits += 1;
            }
        }
        pairs.clear();
        self.second_run = pairs;
    }

    fn dynamic_pass(&mut self, ctx: &mut EngineEcs, dt: f32) {
        let mut candidates = std::mem::take(&mut self.candidates);
        for a in self.dynamics.to_vec() {
            if ctx.test_signature::<Garrisoned>(a) {
                continue;
            }
            let Some((shape, origin)) = world_shape(ctx.world(), a) else {
                continue;
            };
            let (min, max) = self.padded(shape.bound_relative_to(origin));
            self.dynamic_grid.find_near_into(origin, min, max, &mut candidates);

            for &b in &candidates {
                if b == a || ctx.test_signature::<Garrisoned>(b) {
                    continue;
                }
                // `a` may have moved already this pass.
                let (Some((shape_a, _)), Some((shape_b, _))) = (world_shape(ctx.world(), a), world_shape(ctx.world(), b))
                else {
                    continue;
                };
                let push = minimal_push(&shape_a, &shape_b);
                if push == Vec2::ZERO {
                    continue;
                }
                tracing::trace!(a = %a, b = %b, ?push, "dynamic collision");
                self.displace(ctx, a, push, false, dt);
                ctx.emit(&Event::DynamicCollision { a, b, push });
                self.stats.dynamic_hits += 1;
            }
        }
        self.candidates = candidates;
    }

    /// Move `handle` by `push`.
    ///
    /// Outside the second run, a velocity loses its component pointing into
    /// the surface, and its tangential part scaled by friction is added to the
    /// displacement.
    fn displace(&mut self, ctx: &mut EngineEcs, handle: InstanceHandle, push: Vec2, second_run: bool, dt: f32) {
        let Some(translation) = ctx.try_instance(handle).map(|i| i.transform.translation) else {
            return;
        };
        let mut offset = push;
        if !second_run {
            if let Some(Velocity(velocity)) = ctx.try_get_component_mut::<Velocity>(handle) {
                let normal = push.normalize_or_zero();
                let along = velocity.dot(normal);
                let tangent = *velocity - normal * along;
                if along < 0.0 {
                    *velocity = tangent;
                }
                offset += tangent * self.friction * dt;
            }
        }
        let target = translation + Vec3::new(offset.x, 0.0, offset.y);
        if let Err(err) = ctx.set_translation(handle, target) {
            tracing::warn!(instance = %handle, %err, "dropped collision displacement");
            return;
        }
        if let Some((shape, origin)) = world_shape(ctx.world(), handle) {
            self.dynamic_grid
                .update_instance(handle, origin, Some(shape.bound_relative_to(origin)));
        }
    }
}

/// World-space shape of `handle` and its translation.
fn world_shape(world: &World, handle: InstanceHandle) -> Option<(WorldShape, Vec3)> {
    let instance = world.try_instance(handle)?;
    let collider = world.try_get_component::<Collider>(handle)?;
    Some((collider.shape.to_world(&instance.transform), instance.transform.translation))
}

impl System<EngineEcs> for CollisionResolver {
    fn add_entity(&mut self, world: &World, handle: InstanceHandle) {
        let Some(dynamic) = world.try_get_component::<Collider>(handle).map(|c| c.dynamic) else {
            return;
        };
        let Some((shape, origin)) = world_shape(world, handle) else {
            return;
        };
        let bound = shape.bound_relative_to(origin);
        if dynamic {
            if self.statics.remove(handle) {
                self.static_grid.remove_instance(handle);
            }
            self.dynamics.insert(handle);
            self.dynamic_grid.add_instance(handle, origin, bound);
        } else {
            if self.dynamics.remove(handle) {
                self.dynamic_grid.remove_instance(handle);
            }
            self.statics.insert(handle);
            self.static_grid.add_instance(handle, origin, bound);
        }
    }

    fn remove_entity(&mut self, _world: &World, handle: InstanceHandle) {
        self.statics.remove(handle);
        self.dynamics.remove(handle);
        self.static_grid.remove_instance(handle);
        self.dynamic_grid.remove_instance(handle);
    }

    fn remove_all(&mut self) {
        self.statics.clear();
        self.dynamics.clear();
        self.static_grid.clear();
        self.dynamic_grid.clear();
        self.second_run.clear();
    }

    fn update(&mut self, ctx: &mut EngineEcs, dt: f32) {
        self.stats = CollisionStats::default();
        self.refresh_dynamics(ctx);
        self.static_pass(ctx, dt);
        self.second_run_pass(ctx, dt);
        self.dynamic_pass(ctx, dt);
        tracing::trace!(
            statics = self.statics.len(),
            dynamics = self.dynamics.len(),
            static_hits = self.stats.static_hits,
            dynamic_hits = self.stats.dynamic_hits,
            "collision pass complete"
        );
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
