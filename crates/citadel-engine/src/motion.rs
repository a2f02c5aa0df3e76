//! Velocity integration.

use std::any::Any;

use citadel_ecs::entity::InstanceHandle;
use citadel_ecs::glam::{Vec2, Vec3};
use citadel_ecs::system::{EntitySet, System};
use citadel_ecs::world::World;

use crate::collision::{Garrisoned, Velocity};
use crate::facade::EngineEcs;

pub const MOTION_SYSTEM_NAME: &str = "motion";

/// Moves every instance with a [`Velocity`] by `velocity * dt` on the ground
/// plane. Garrisoned units stay put.
///
/// Register it before the collision resolver so bodies are pushed out of
/// whatever they moved into on the same tick.
#[derive(Debug, Default)]
pub struct Motion {
    members: EntitySet,
}

impl Motion {
    pub fn members(&self) -> &EntitySet {
        &self.members
    }
}

impl System<EngineEcs> for Motion {
    fn add_entity(&mut self, _world: &World, handle: InstanceHandle) {
        self.members.insert(handle);
    }

    fn remove_entity(&mut self, _world: &World, handle: InstanceHandle) {
        self.members.remove(handle);
    }

    fn remove_all(&mut self) {
        self.members.clear();
    }

    fn update(&mut self, ctx: &mut EngineEcs, dt: f32) {
        for handle in self.members.iter() {
            if ctx.test_signature::<Garrisoned>(handle) {
                continue;
            }
            let Some(&Velocity(velocity)) = ctx.try_get_component::<Velocity>(handle) else {
                continue;
            };
            if velocity == Vec2::ZERO {
                continue;
            }
            let delta = Vec3::new(velocity.x, 0.0, velocity.y) * dt;
            if let Err(err) = ctx.translate(handle, delta) {
                tracing::warn!(instance = %handle, %err, "skipped motion step");
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
