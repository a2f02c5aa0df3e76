//! Citadel ECS -- stable-handle instance pool, packed component storage and
//! signature-based system membership.
//!
//! Instances live in a fixed-capacity [`InstancePool`](entity::InstancePool)
//! and are referred to by generational [`InstanceHandle`](entity::InstanceHandle)s.
//! Each component type gets one signature bit and one dense
//! [`ComponentStore`](component::ComponentStore). Systems declare a required
//! [`Signature`](signature::Signature) and are kept in sync by the
//! [`SystemRegistry`](system::SystemRegistry).
//!
//! # Quick Start
//!
//! ```
//! use citadel_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Health(u32);
//!
//! let mut world = World::new(64);
//! world.register_component::<Health>("health").unwrap();
//!
//! let unit = world.create_instance(Transform::on_ground(1.0, 2.0), Aabb::point()).unwrap();
//! world.insert_component(unit, Health(30)).unwrap();
//!
//! assert!(world.test_signature::<Health>(unit));
//! assert_eq!(world.try_get_component::<Health>(unit), Some(&Health(30)));
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod entity;
pub mod signature;
pub mod system;
pub mod transform;
pub mod world;

pub use glam;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Contract violations reported by ECS operations.
///
/// Soft misses (dead handle, absent component) are reported through the
/// `try_*` family as `None` instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    /// The handle is stale, invalid or was never allocated.
    #[error("instance {handle} is not live")]
    StaleInstance { handle: entity::InstanceHandle },

    /// Every slot of the pool is in use.
    #[error("instance pool exhausted (capacity {capacity})")]
    PoolExhausted { capacity: usize },

    #[error("instance {handle} already has a '{component}' component")]
    DuplicateComponent {
        handle: entity::InstanceHandle,
        component: &'static str,
    },

    #[error("instance {handle} has no '{component}' component")]
    ComponentNotFound {
        handle: entity::InstanceHandle,
        component: &'static str,
    },

    #[error("component type {type_name} is not registered")]
    UnregisteredComponent { type_name: &'static str },

    #[error("component type '{name}' is already registered")]
    DuplicateRegistration { name: &'static str },

    #[error("cannot register '{name}': signature capacity of {limit} component types reached")]
    SignatureCapacity { name: &'static str, limit: usize },

    #[error("system type {type_name} is not registered")]
    UnregisteredSystem { type_name: &'static str },

    #[error("system '{name}' is already registered")]
    DuplicateSystem { name: &'static str },

    /// The system is checked out for its own update.
    #[error("system '{name}' is running")]
    SystemBusy { name: &'static str },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{Component, ComponentRegistry, ComponentStore, ComponentTypeId};
    pub use crate::entity::{Instance, InstanceHandle, InstancePool};
    pub use crate::signature::{Signature, MAX_COMPONENT_TYPES};
    pub use crate::system::{EntitySet, System, SystemId, SystemRegistry};
    pub use crate::transform::{Aabb, Transform};
    pub use crate::world::{Prototype, World};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
