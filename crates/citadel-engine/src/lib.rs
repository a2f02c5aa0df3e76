//! Citadel Engine -- simulation kernel built on [`citadel_ecs`].
//!
//! This crate wires the ECS into a running simulation: the [`EngineEcs`]
//! facade that owns every manager, a uniform [`SpatialGrid`] for proximity
//! queries, SAT-based collision resolution, an event bus, and fixed-timestep
//! driving with determinism digests.
//!
//! [`EngineEcs`]: facade::EngineEcs
//! [`SpatialGrid`]: spatial::SpatialGrid
//!
//! # Quick Start
//!
//! ```
//! use citadel_engine::prelude::*;
//!
//! let mut ecs = EngineEcs::new(EngineConfig::default()).unwrap();
//! ecs.register_motion().unwrap();
//! ecs.register_collision().unwrap();
//!
//! let tower = ecs.create_instance(Transform::on_ground(0.0, 0.0), Aabb::point()).unwrap();
//! ecs.create_component(tower, Collider::fixed(Shape::rect(Vec2::splat(2.0)))).unwrap();
//!
//! let scout = ecs.create_instance(Transform::on_ground(-6.0, 0.0), Aabb::point()).unwrap();
//! ecs.create_component(scout, Collider::dynamic(Shape::circle(0.5))).unwrap();
//! ecs.create_component(scout, Velocity(Vec2::new(4.0, 0.0))).unwrap();
//!
//! ecs.run_ticks(120);
//! // The scout walked into the tower and was held at its face.
//! let x = ecs.instance(scout).unwrap().transform.translation.x;
//! assert!(x <= -2.5 + 1e-3);
//! ```

#![deny(unsafe_code)]

pub mod collision;
pub mod config;
pub mod events;
pub mod facade;
pub mod motion;
pub mod spatial;
pub mod tick;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the ECS crate for convenience.
pub use citadel_ecs;

/// Errors raised while building an engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Ecs(#[from] citadel_ecs::EcsError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use citadel_ecs::glam::{Quat, UVec2, Vec2, Vec3};
    pub use citadel_ecs::prelude::*;

    pub use crate::collision::{
        minimal_push, Collider, CollisionResolver, CollisionStats, Destructible, Garrisoned, Shape, Velocity,
        WorldShape, COLLISION_SYSTEM_NAME,
    };
    pub use crate::config::{CollisionConfig, ConfigError, EngineConfig};
    pub use crate::events::{Event, EventBus, EventKind, ListenerId};
    pub use crate::facade::EngineEcs;
    pub use crate::motion::{Motion, MOTION_SYSTEM_NAME};
    pub use crate::spatial::{CellRange, SpatialGrid};
    pub use crate::tick::TickDiagnostics;
    pub use crate::EngineError;
}
