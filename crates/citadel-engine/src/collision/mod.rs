//! Narrow-phase collision: shapes, the SAT overlap test and the resolver
//! system that keeps dynamic bodies out of static ones and out of each other.
//!
//! The components defined here are registered by
//! [`EngineEcs::new`](crate::facade::EngineEcs::new), so every engine
//! instance can carry them without further setup.

mod resolver;
mod shape;

pub use resolver::{CollisionResolver, CollisionStats, COLLISION_SYSTEM_NAME};
pub use shape::{minimal_push, Shape, WorldShape};

use citadel_ecs::glam::Vec2;
use serde::{Deserialize, Serialize};

/// Collision body attached to an instance.
///
/// The `dynamic` flag is read when the instance joins the resolver: dynamic
/// bodies get pushed, static ones never move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collider {
    pub shape: Shape,
    pub dynamic: bool,
}

impl Collider {
    pub fn fixed(shape: Shape) -> Self {
        Self { shape, dynamic: false }
    }

    pub fn dynamic(shape: Shape) -> Self {
        Self { shape, dynamic: true }
    }
}

/// Ground-plane velocity in units per second (X, Z).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity(pub Vec2);

/// Static body that is removed once its health drops to zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Destructible {
    pub health: f32,
}

/// Unit stationed inside a building; ignored by collision and motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Garrisoned;
