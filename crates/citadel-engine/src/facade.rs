//! [`EngineEcs`]: the single entry point to the simulation kernel.
//!
//! The facade owns the [`World`], the [`SystemRegistry`], the proximity
//! [`SpatialGrid`] and the [`EventBus`], and keeps them consistent:
//!
//! - every component add/remove re-evaluates system membership for the
//!   instance, so `handle ∈ system ⇔ signature ⊇ required` holds after each
//!   call;
//! - instances carrying the [`Prototype`] marker are kept out of every system;
//! - moves go through the facade so the grid and listeners see them;
//! - destruction tears down membership, components, the grid entry and the
//!   pool slot, in that order.
//!
//! # Example
//!
//! ```
//! use citadel_engine::prelude::*;
//!
//! let mut ecs = EngineEcs::new(EngineConfig::default()).unwrap();
//! ecs.register_collision().unwrap();
//!
//! let wall = ecs.create_instance(Transform::on_ground(0.0, 0.0), Aabb::point()).unwrap();
//! ecs.create_component(wall, Collider::fixed(Shape::rect(Vec2::ONE))).unwrap();
//!
//! let unit = ecs.create_instance(Transform::on_ground(1.5, 0.0), Aabb::point()).unwrap();
//! ecs.create_component(unit, Collider::dynamic(Shape::rect(Vec2::ONE))).unwrap();
//!
//! ecs.tick();
//! assert_eq!(ecs.instance(unit).unwrap().transform.translation.x, 2.0);
//! ```

use citadel_ecs::component::{Component, ComponentTypeId};
use citadel_ecs::entity::{Instance, InstanceHandle};
use citadel_ecs::glam::Vec3;
use citadel_ecs::signature::Signature;
use citadel_ecs::system::{System, SystemId, SystemRegistry};
use citadel_ecs::transform::{Aabb, Transform};
use citadel_ecs::world::{Prototype, World};
use citadel_ecs::EcsError;

use crate::collision::{Collider, CollisionResolver, Destructible, Garrisoned, Velocity, COLLISION_SYSTEM_NAME};
use crate::config::EngineConfig;
use crate::events::{Event, EventBus, EventKind, ListenerId};
use crate::motion::{Motion, MOTION_SYSTEM_NAME};
use crate::spatial::SpatialGrid;
use crate::EngineError;

/// Owns every kernel manager and mediates all access to them.
pub struct EngineEcs {
    pub(crate) world: World,
    pub(crate) systems: SystemRegistry<EngineEcs>,
    pub(crate) grid: SpatialGrid,
    pub(crate) events: EventBus,
    pub(crate) pending_destroy: Vec<InstanceHandle>,
    pub(crate) pending_moves: Vec<InstanceHandle>,
    pub(crate) config: EngineConfig,
    pub(crate) tick_counter: u64,
}

impl std::fmt::Debug for EngineEcs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineEcs")
            .field("instances", &self.world.instance_count())
            .field("components", &self.world.components().names())
            .field("systems", &self.systems.names())
            .field("tick", &self.tick_counter)
            .finish()
    }
}

impl EngineEcs {
    /// Build an engine from a validated config.
    ///
    /// The collision and motion components are registered up front; their
    /// systems are opt-in through [`register_collision`](Self::register_collision)
    /// and [`register_motion`](Self::register_motion).
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let mut world = World::new(config.max_instances);
        world.register_component::<Collider>("collider")?;
        world.register_component::<Velocity>("velocity")?;
        world.register_component::<Destructible>("destructible")?;
        world.register_component::<Garrisoned>("garrisoned")?;
        tracing::debug!(
            max_instances = config.max_instances,
            cells = ?config.grid_cells,
            "engine created"
        );
        Ok(Self {
            world,
            systems: SystemRegistry::new(),
            grid: SpatialGrid::new(config.grid_cells, config.world_bounds),
            events: EventBus::new(),
            pending_destroy: Vec::new(),
            pending_moves: Vec::new(),
            config,
            tick_counter: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read access to the world. Mutation goes through the facade.
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    // -- registration -------------------------------------------------------

    pub fn register_component<T: Component>(&mut self, name: &'static str) -> Result<ComponentTypeId, EcsError> {
        self.world.register_component::<T>(name)
    }

    pub fn component_id<T: Component>(&self) -> Result<ComponentTypeId, EcsError> {
        self.world.components().id_of::<T>()
    }

    /// Signature with exactly the bit of `T` set.
    pub fn signature_of<T: Component>(&self) -> Result<Signature, EcsError> {
        self.world.components().signature_of::<T>()
    }

    /// Register a system with its required signature.
    ///
    /// Instances that already qualify join it immediately. Systems update in
    /// registration order.
    pub fn register_system<S: System<EngineEcs>>(
        &mut self,
        name: &'static str,
        system: S,
        required: Signature,
    ) -> Result<SystemId, EcsError> {
        let id = self.systems.register(name, system)?;
        self.systems.set_signature::<S>(required)?;
        self.reevaluate_all();
        Ok(id)
    }

    /// Change a system's required signature and re-sort every instance.
    pub fn set_system_signature<S: System<EngineEcs>>(&mut self, required: Signature) -> Result<(), EcsError> {
        self.systems.set_signature::<S>(required)?;
        self.reevaluate_all();
        Ok(())
    }

    /// Register the [`CollisionResolver`] over every [`Collider`].
    pub fn register_collision(&mut self) -> Result<SystemId, EcsError> {
        let required = self.signature_of::<Collider>()?;
        let resolver = CollisionResolver::new(&self.config);
        self.register_system(COLLISION_SYSTEM_NAME, resolver, required)
    }

    /// Register the [`Motion`] integrator over every [`Velocity`].
    pub fn register_motion(&mut self) -> Result<SystemId, EcsError> {
        let required = self.signature_of::<Velocity>()?;
        self.register_system(MOTION_SYSTEM_NAME, Motion::default(), required)
    }

    pub fn system<S: System<EngineEcs>>(&self) -> Result<&S, EcsError> {
        self.systems.get::<S>()
    }

    pub fn system_mut<S: System<EngineEcs>>(&mut self) -> Result<&mut S, EcsError> {
        self.systems.get_mut::<S>()
    }

    pub fn system_names(&self) -> Vec<&'static str> {
        self.systems.names()
    }

    // -- events -------------------------------------------------------------

    pub fn subscribe(&mut self, kind: EventKind, listener: impl FnMut(&Event) + 'static) -> ListenerId {
        self.events.subscribe(kind, listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn emit(&mut self, event: &Event) {
        self.events.emit(event);
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // -- instances ----------------------------------------------------------

    pub fn create_instance(&mut self, transform: Transform, bound: Aabb) -> Result<InstanceHandle, EcsError> {
        let handle = self.world.create_instance(transform, bound)?;
        let relative = self.world.instance(handle)?.relative_bound();
        self.grid.add_instance(handle, transform.translation, relative);
        self.update_systems(handle);
        tracing::debug!(instance = %handle, "instance created");
        self.events.emit(&Event::InstanceCreated { handle });
        Ok(handle)
    }

    /// Tear down `handle` now. Returns `false` if it was not live.
    ///
    /// Safe to call from inside a system update: membership changes for the
    /// running system are deferred until it is checked back in.
    pub fn destroy_instance(&mut self, handle: InstanceHandle) -> bool {
        if !self.world.is_live(handle) {
            tracing::warn!(instance = %handle, "destroy of a dead instance ignored");
            return false;
        }
        self.systems.on_instance_destroyed(&self.world, handle);
        if let Err(err) = self.world.remove_all_components(handle) {
            tracing::warn!(instance = %handle, %err, "component teardown failed");
        }
        self.grid.remove_instance(handle);
        self.world.destroy_instance(handle);
        tracing::debug!(instance = %handle, "instance destroyed");
        self.events.emit(&Event::InstanceDestroyed { handle });
        true
    }

    /// Destroy `handle` after the running system has been checked back in.
    pub fn queue_destroy(&mut self, handle: InstanceHandle) {
        if !self.pending_destroy.contains(&handle) {
            self.pending_destroy.push(handle);
        }
    }

    /// Destroy every queued instance. Returns how many were still live.
    pub(crate) fn flush_destroys(&mut self) -> usize {
        let queued = std::mem::take(&mut self.pending_destroy);
        queued
            .into_iter()
            .filter(|&h| self.world.is_live(h) && self.destroy_instance(h))
            .count()
    }

    #[inline]
    pub fn is_live(&self, handle: InstanceHandle) -> bool {
        self.world.is_live(handle)
    }

    pub fn instance(&self, handle: InstanceHandle) -> Result<&Instance, EcsError> {
        self.world.instance(handle)
    }

    pub fn try_instance(&self, handle: InstanceHandle) -> Option<&Instance> {
        self.world.try_instance(handle)
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> + '_ {
        self.world.instances()
    }

    pub fn instance_count(&self) -> usize {
        self.world.instance_count()
    }

    /// Spawn a copy of `prototype` at `transform`.
    ///
    /// The copy gets every component of the template except the
    /// [`Prototype`] marker, and joins systems like any other instance.
    pub fn instantiate(&mut self, prototype: InstanceHandle, transform: Transform) -> Result<InstanceHandle, EcsError> {
        let bound = self.world.instance(prototype)?.bound;
        let handle = self.create_instance(transform, bound)?;
        if let Err(err) = self.world.clone_components(prototype, handle) {
            self.destroy_instance(handle);
            return Err(err);
        }
        if self.world.test_signature::<Prototype>(handle) {
            self.world.remove_component::<Prototype>(handle)?;
        }
        self.update_systems(handle);
        Ok(handle)
    }

    // -- movement -----------------------------------------------------------

    /// Replace the whole pose. The grid entry is refreshed with the new bound.
    pub fn set_transform(&mut self, handle: InstanceHandle, transform: Transform) -> Result<(), EcsError> {
        let instance = self.world.instance_mut(handle)?;
        instance.transform = transform;
        let relative = instance.relative_bound();
        self.grid.update_instance(handle, transform.translation, Some(relative));
        self.notify_moved(handle);
        self.events.emit(&Event::InstanceMoved {
            handle,
            translation: transform.translation,
        });
        Ok(())
    }

    pub fn set_translation(&mut self, handle: InstanceHandle, translation: Vec3) -> Result<(), EcsError> {
        self.world.instance_mut(handle)?.transform.translation = translation;
        self.grid.update_instance(handle, translation, None);
        self.notify_moved(handle);
        self.events.emit(&Event::InstanceMoved { handle, translation });
        Ok(())
    }

    pub fn translate(&mut self, handle: InstanceHandle, delta: Vec3) -> Result<(), EcsError> {
        let translation = self.world.instance(handle)?.transform.translation + delta;
        self.set_translation(handle, translation)
    }

    /// Replace the local bound and refresh the grid entry.
    pub fn set_bound(&mut self, handle: InstanceHandle, bound: Aabb) -> Result<(), EcsError> {
        let instance = self.world.instance_mut(handle)?;
        instance.bound = bound;
        let (translation, relative) = (instance.transform.translation, instance.relative_bound());
        self.grid.update_instance(handle, translation, Some(relative));
        self.notify_moved(handle);
        Ok(())
    }

    /// Keep the resolver's grids in step with a pose change.
    ///
    /// While the resolver is checked out for its own update the move is
    /// queued and applied by [`flush_moves`](Self::flush_moves).
    fn notify_moved(&mut self, handle: InstanceHandle) {
        match self.systems.get_mut::<CollisionResolver>() {
            Ok(resolver) => resolver.instance_moved(&self.world, handle),
            Err(EcsError::SystemBusy { .. }) => self.pending_moves.push(handle),
            Err(_) => {}
        }
    }

    /// Apply moves queued while the resolver was busy.
    pub(crate) fn flush_moves(&mut self) {
        if self.pending_moves.is_empty() {
            return;
        }
        let Ok(resolver) = self.systems.get_mut::<CollisionResolver>() else {
            return;
        };
        for handle in self.pending_moves.drain(..) {
            resolver.instance_moved(&self.world, handle);
        }
    }

    /// Instances whose grid cells touch the box
    /// `[translation + min_offset, translation + max_offset]`.
    ///
    /// Conservative: callers re-check exact overlap. Prototypes are left out.
    pub fn find_near(&mut self, translation: Vec3, min_offset: Vec3, max_offset: Vec3) -> Vec<InstanceHandle> {
        let mut found = self.grid.find_near(translation, min_offset, max_offset);
        found.retain(|&h| !self.world.is_prototype(h));
        found
    }

    // -- components ---------------------------------------------------------

    /// Attach `value` to `handle` and update system membership.
    pub fn create_component<T: Component>(&mut self, handle: InstanceHandle, value: T) -> Result<&mut T, EcsError> {
        self.world.insert_component(handle, value)?;
        self.update_systems(handle);
        self.world.get_component_mut::<T>(handle)
    }

    pub fn remove_component<T: Component>(&mut self, handle: InstanceHandle) -> Result<T, EcsError> {
        let (value, _) = self.world.remove_component::<T>(handle)?;
        self.update_systems(handle);
        Ok(value)
    }

    /// [`remove_component`](Self::remove_component) that treats a dead handle
    /// or an absent component as a soft miss.
    pub fn try_remove_component<T: Component>(&mut self, handle: InstanceHandle) -> Option<T> {
        if !self.world.test_signature::<T>(handle) {
            return None;
        }
        self.remove_component::<T>(handle).ok()
    }

    /// Strip every component. The instance leaves every system.
    pub fn remove_all_components(&mut self, handle: InstanceHandle) -> Result<usize, EcsError> {
        let removed = self.world.remove_all_components(handle)?;
        self.update_systems(handle);
        Ok(removed)
    }

    /// Make `dest` carry clones of exactly `source`'s components.
    pub fn clone_components(&mut self, source: InstanceHandle, dest: InstanceHandle) -> Result<(), EcsError> {
        self.world.clone_components(source, dest)?;
        self.update_systems(dest);
        Ok(())
    }

    pub fn get_component<T: Component>(&self, handle: InstanceHandle) -> Result<&T, EcsError> {
        self.world.instance(handle)?;
        self.world.get_component::<T>(handle)
    }

    pub fn get_component_mut<T: Component>(&mut self, handle: InstanceHandle) -> Result<&mut T, EcsError> {
        self.world.instance(handle)?;
        self.world.get_component_mut::<T>(handle)
    }

    pub fn try_get_component<T: Component>(&self, handle: InstanceHandle) -> Option<&T> {
        self.world.try_get_component::<T>(handle)
    }

    pub fn try_get_component_mut<T: Component>(&mut self, handle: InstanceHandle) -> Option<&mut T> {
        self.world.try_get_component_mut::<T>(handle)
    }

    pub fn test_signature<T: Component>(&self, handle: InstanceHandle) -> bool {
        self.world.test_signature::<T>(handle)
    }

    pub fn signature(&self, handle: InstanceHandle) -> Option<Signature> {
        self.world.signature(handle)
    }

    pub fn is_prototype(&self, handle: InstanceHandle) -> bool {
        self.world.is_prototype(handle)
    }

    // -- membership ---------------------------------------------------------

    /// Re-sort `handle` into systems. Prototypes are evicted first, whatever
    /// their signature.
    fn update_systems(&mut self, handle: InstanceHandle) {
        if self.world.is_prototype(handle) {
            self.systems.on_instance_destroyed(&self.world, handle);
        } else if let Some(signature) = self.world.signature(handle) {
            self.systems.on_signature_changed(&self.world, handle, signature);
        }
    }

    fn reevaluate_all(&mut self) {
        let handles = self.world.pool().live_handles().to_vec();
        for handle in handles {
            self.update_systems(handle);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::cell::RefCell;
    use std::rc::Rc;

    use citadel_ecs::system::EntitySet;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Health(i32);

    #[derive(Default)]
    struct Medics {
        members: EntitySet,
    }

    impl System<EngineEcs> for Medics {
        fn add_entity(&mut self, _world: &World, handle: InstanceHandle) {
            self.members.insert(handle);
        }
        fn remove_entity(&mut self, _world: &World, handle: InstanceHandle) {
            self.members.remove(handle);
        }
        fn remove_all(&mut self) {
            self.members.clear();
        }
        fn update(&mut self, ctx: &mut EngineEcs, _dt: f32) {
            for handle in self.members.iter() {
                if let Some(health) = ctx.try_get_component_mut::<Health>(handle) {
                    health.0 += 1;
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

    fn setup() -> EngineEcs {
        let mut ecs = EngineEcs::new(EngineConfig::default()).unwrap();
        ecs.register_component::<Health>("health").unwrap();
        let required = ecs.signature_of::<Health>().unwrap();
        ecs.register_system("medics", Medics::default(), required).unwrap();
        ecs
    }

    fn spawn(ecs: &mut EngineEcs) -> InstanceHandle {
        ecs.create_instance(Transform::IDENTITY, Aabb::point()).unwrap()
    }

    fn members(ecs: &EngineEcs) -> &EntitySet {
        &ecs.system::<Medics>().unwrap().members
    }

    #[test]
    fn component_changes_drive_membership() {
        let mut ecs = setup();
        let e = spawn(&mut ecs);
        assert!(!members(&ecs).contains(e));

        ecs.create_component(e, Health(5)).unwrap().0 += 1;
        assert!(members(&ecs).contains(e));
        assert_eq!(ecs.get_component::<Health>(e).unwrap(), &Health(6));

        assert_eq!(ecs.remove_component::<Health>(e).unwrap(), Health(6));
        assert!(!members(&ecs).contains(e));
        assert_eq!(ecs.try_remove_component::<Health>(e), None);
    }

    #[test]
    fn late_registered_system_picks_up_existing_instances() {
        let mut ecs = EngineEcs::new(EngineConfig::default()).unwrap();
        ecs.register_component::<Health>("health").unwrap();
        let e = spawn(&mut ecs);
        ecs.create_component(e, Health(1)).unwrap();

        let required = ecs.signature_of::<Health>().unwrap();
        ecs.register_system("medics", Medics::default(), required).unwrap();
        assert!(members(&ecs).contains(e));
    }

    #[test]
    fn prototypes_never_join_systems() {
        let mut ecs = setup();
        let template = spawn(&mut ecs);
        ecs.create_component(template, Health(10)).unwrap();
        assert!(members(&ecs).contains(template));

        ecs.create_component(template, Prototype).unwrap();
        assert!(!members(&ecs).contains(template));
        assert!(ecs.is_prototype(template));

        let unit = ecs.instantiate(template, Transform::on_ground(40.0, 40.0)).unwrap();
        assert!(members(&ecs).contains(unit));
        assert!(!ecs.test_signature::<Prototype>(unit));
        assert_eq!(ecs.get_component::<Health>(unit).unwrap(), &Health(10));
        assert!(ecs.find_near(Vec3::ZERO, Vec3::splat(-1.0), Vec3::splat(1.0)).is_empty());
    }

    #[test]
    fn destroy_tears_everything_down() {
        let mut ecs = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        ecs.subscribe(EventKind::InstanceDestroyed, move |event| sink.borrow_mut().push(event.clone()));

        let e = spawn(&mut ecs);
        ecs.create_component(e, Health(1)).unwrap();
        assert!(ecs.destroy_instance(e));
        assert!(!ecs.destroy_instance(e));

        assert!(!ecs.is_live(e));
        assert!(members(&ecs).is_empty());
        assert!(!ecs.grid().contains(e));
        assert_eq!(ecs.world().store::<Health>().unwrap().len(), 0);
        assert_eq!(*log.borrow(), vec![Event::InstanceDestroyed { handle: e }]);
        assert!(matches!(ecs.get_component::<Health>(e), Err(EcsError::StaleInstance { .. })));
    }

    #[test]
    fn movement_updates_grid_and_notifies() {
        let mut ecs = setup();
        let moved = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&moved);
        ecs.subscribe(EventKind::InstanceMoved, move |_| *counter.borrow_mut() += 1);

        let e = spawn(&mut ecs);
        ecs.set_translation(e, Vec3::new(100.0, 0.0, 100.0)).unwrap();
        ecs.translate(e, Vec3::new(1.0, 0.0, 0.0)).unwrap();

        assert_eq!(*moved.borrow(), 2);
        assert!(ecs.find_near(Vec3::ZERO, Vec3::splat(-1.0), Vec3::splat(1.0)).is_empty());
        assert_eq!(
            ecs.find_near(Vec3::new(101.0, 0.0, 100.0), Vec3::splat(-1.0), Vec3::splat(1.0)),
            vec![e]
        );
    }

    #[test]
    fn pool_exhaustion_is_an_error_value() {
        let config = EngineConfig {
            max_instances: 1,
            ..EngineConfig::default()
        };
        let mut ecs = EngineEcs::new(config).unwrap();
        spawn(&mut ecs);
        assert!(matches!(
            ecs.create_instance(Transform::IDENTITY, Aabb::point()),
            Err(EcsError::PoolExhausted { capacity: 1 })
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            fixed_dt: -1.0,
            ..EngineConfig::default()
        };
        assert!(matches!(EngineEcs::new(config), Err(EngineError::Config(_))));
    }
}
