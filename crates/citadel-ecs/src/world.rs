//! The [`World`] owns the instance pool and the component registry and keeps
//! each instance's cached [`Signature`] in step with its components.
//!
//! Every mutating call here updates the cache in the same step as the store,
//! so `signature(h)` always equals the set of stores containing `h`. System
//! membership is layered on top by the engine facade.

use crate::component::{Component, ComponentRegistry, ComponentStore, ComponentTypeId};
use crate::entity::{Instance, InstanceHandle, InstancePool};
use crate::signature::Signature;
use crate::transform::{Aabb, Transform};
use crate::EcsError;

/// Marker for template instances.
///
/// Prototypes carry a full component set so factories can clone them, but
/// they never join a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Prototype;

/// Instance pool plus component storage.
#[derive(Debug)]
pub struct World {
    pub(crate) pool: InstancePool,
    pub(crate) components: ComponentRegistry,
    prototype: ComponentTypeId,
}

impl World {
    /// Create a world holding at most `capacity` live instances.
    ///
    /// The built-in [`Prototype`] marker is registered first and therefore
    /// always owns signature bit 0.
    pub fn new(capacity: usize) -> Self {
        let mut components = ComponentRegistry::new();
        let prototype = components
            .register::<Prototype>("prototype")
            .expect("empty registry accepts the first type");
        Self {
            pool: InstancePool::new(capacity),
            components,
            prototype,
        }
    }

    pub fn register_component<T: Component>(
        &mut self,
        name: &'static str,
    ) -> Result<ComponentTypeId, EcsError> {
        self.components.register::<T>(name)
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn pool(&self) -> &InstancePool {
        &self.pool
    }

    pub fn prototype_id(&self) -> ComponentTypeId {
        self.prototype
    }

    // -- instances ----------------------------------------------------------

    pub fn create_instance(
        &mut self,
        transform: Transform,
        bound: Aabb,
    ) -> Result<InstanceHandle, EcsError> {
        self.pool.create(transform, bound)
    }

    /// Remove every component, then free the slot.
    ///
    /// Returns `false` if the handle was not live.
    pub fn destroy_instance(&mut self, handle: InstanceHandle) -> bool {
        if !self.pool.is_live(handle) {
            return false;
        }
        self.components.entity_destroyed(handle);
        self.pool.release(handle)
    }

    #[inline]
    pub fn is_live(&self, handle: InstanceHandle) -> bool {
        self.pool.is_live(handle)
    }

    pub fn instance(&self, handle: InstanceHandle) -> Result<&Instance, EcsError> {
        self.pool.get(handle)
    }

    pub fn instance_mut(&mut self, handle: InstanceHandle) -> Result<&mut Instance, EcsError> {
        self.pool.get_mut(handle)
    }

    pub fn try_instance(&self, handle: InstanceHandle) -> Option<&Instance> {
        self.pool.try_get(handle)
    }

    pub fn try_instance_mut(&mut self, handle: InstanceHandle) -> Option<&mut Instance> {
        self.pool.try_get_mut(handle)
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> + '_ {
        self.pool.iter()
    }

    pub fn instance_count(&self) -> usize {
        self.pool.len()
    }

    // -- signatures ---------------------------------------------------------

    pub fn signature(&self, handle: InstanceHandle) -> Option<Signature> {
        self.pool.try_get(handle).map(Instance::signature)
    }

    /// Cheap "does `handle` own a `T`" check against the cached signature.
    pub fn test_signature<T: Component>(&self, handle: InstanceHandle) -> bool {
        match (self.components.lookup::<T>(), self.pool.try_get(handle)) {
            (Some(id), Some(instance)) => instance.signature.test(id),
            _ => false,
        }
    }

    pub fn is_prototype(&self, handle: InstanceHandle) -> bool {
        self.pool
            .try_get(handle)
            .is_some_and(|i| i.signature.test(self.prototype))
    }

    // -- components ---------------------------------------------------------

    /// Attach `value` to `handle` and set its signature bit.
    ///
    /// Returns the updated signature.
    pub fn insert_component<T: Component>(
        &mut self,
        handle: InstanceHandle,
        value: T,
    ) -> Result<Signature, EcsError> {
        let id = self.components.id_of::<T>()?;
        let instance = self.pool.get_mut(handle)?;
        self.components.store_mut::<T>()?.insert(handle, value)?;
        instance.signature.set(id);
        Ok(instance.signature)
    }

    /// Detach `T` from `handle` and clear its signature bit.
    pub fn remove_component<T: Component>(
        &mut self,
        handle: InstanceHandle,
    ) -> Result<(T, Signature), EcsError> {
        let id = self.components.id_of::<T>()?;
        let instance = self.pool.get_mut(handle)?;
        let value = self.components.store_mut::<T>()?.remove(handle)?;
        instance.signature.reset(id);
        Ok((value, instance.signature))
    }

    /// Best-effort removal of every component; the signature ends up empty.
    pub fn remove_all_components(&mut self, handle: InstanceHandle) -> Result<usize, EcsError> {
        let instance = self.pool.get_mut(handle)?;
        let removed = self.components.entity_destroyed(handle);
        instance.signature.clear();
        Ok(removed)
    }

    /// Replace `dest`'s components with clones of `source`'s.
    ///
    /// `dest`'s signature becomes a copy of `source`'s.
    pub fn clone_components(
        &mut self,
        source: InstanceHandle,
        dest: InstanceHandle,
    ) -> Result<Signature, EcsError> {
        let source_sig = self.pool.get(source)?.signature;
        self.pool.get(dest)?;
        if source == dest {
            return Ok(source_sig);
        }
        self.components.entity_destroyed(dest);
        let cloned = self.components.clone_all(source, dest)?;
        debug_assert_eq!(cloned, source_sig, "cached signature drifted from stores");
        self.pool.get_mut(dest)?.signature = source_sig;
        Ok(source_sig)
    }

    pub fn get_component<T: Component>(&self, handle: InstanceHandle) -> Result<&T, EcsError> {
        self.components.store::<T>()?.get(handle)
    }

    pub fn get_component_mut<T: Component>(
        &mut self,
        handle: InstanceHandle,
    ) -> Result<&mut T, EcsError> {
        self.components.store_mut::<T>()?.get_mut(handle)
    }

    pub fn try_get_component<T: Component>(&self, handle: InstanceHandle) -> Option<&T> {
        self.components.try_store::<T>()?.try_get(handle)
    }

    pub fn try_get_component_mut<T: Component>(&mut self, handle: InstanceHandle) -> Option<&mut T> {
        self.components.store_mut::<T>().ok()?.try_get_mut(handle)
    }

    pub fn store<T: Component>(&self) -> Result<&ComponentStore<T>, EcsError> {
        self.components.store::<T>()
    }

    pub fn store_mut<T: Component>(&mut self) -> Result<&mut ComponentStore<T>, EcsError> {
        self.components.store_mut::<T>()
    }

    /// Compare every live instance's cached signature with its stores.
    ///
    /// Returns the first handle whose cache disagrees.
    pub fn find_signature_drift(&self) -> Option<InstanceHandle> {
        self.pool
            .iter()
            .find(|i| i.signature != self.components.recompute_signature(i.handle()))
            .map(Instance::handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Health(u32);

    #[derive(Debug, Clone, PartialEq)]
    struct Armor(u32);

    fn setup() -> World {
        let mut world = World::new(16);
        world.register_component::<Health>("health").unwrap();
        world.register_component::<Armor>("armor").unwrap();
        world
    }

    #[test]
    fn prototype_owns_bit_zero() {
        let world = World::new(1);
        assert_eq!(world.prototype_id().index(), 0);
        assert_eq!(world.components().names(), vec!["prototype"]);
    }

    #[test]
    fn insert_and_remove_track_signature() {
        let mut world = setup();
        let e = world.create_instance(Transform::IDENTITY, Aabb::point()).unwrap();
        let sig = world.insert_component(e, Health(10)).unwrap();
        assert!(world.test_signature::<Health>(e));
        assert!(!world.test_signature::<Armor>(e));
        assert_eq!(world.signature(e), Some(sig));

        let (value, sig) = world.remove_component::<Health>(e).unwrap();
        assert_eq!(value, Health(10));
        assert!(sig.is_empty());
        assert!(world.try_get_component::<Health>(e).is_none());
        assert_eq!(world.find_signature_drift(), None);
    }

    #[test]
    fn failed_insert_leaves_signature_untouched() {
        let mut world = setup();
        let e = world.create_instance(Transform::IDENTITY, Aabb::point()).unwrap();
        world.insert_component(e, Armor(1)).unwrap();
        assert!(world.insert_component(e, Armor(2)).is_err());
        assert_eq!(world.get_component::<Armor>(e).unwrap(), &Armor(1));
        assert_eq!(world.find_signature_drift(), None);
    }

    #[test]
    fn operations_on_dead_instance_fail() {
        let mut world = setup();
        let e = world.create_instance(Transform::IDENTITY, Aabb::point()).unwrap();
        world.insert_component(e, Health(1)).unwrap();
        assert!(world.destroy_instance(e));
        assert!(matches!(
            world.insert_component(e, Health(2)),
            Err(EcsError::StaleInstance { .. })
        ));
        assert!(!world.test_signature::<Health>(e));
        assert_eq!(world.store::<Health>().unwrap().len(), 0);
    }

    #[test]
    fn clone_components_replaces_dest_set() {
        let mut world = setup();
        let src = world.create_instance(Transform::IDENTITY, Aabb::point()).unwrap();
        let dst = world.create_instance(Transform::IDENTITY, Aabb::point()).unwrap();
        world.insert_component(src, Health(7)).unwrap();
        world.insert_component(dst, Armor(3)).unwrap();

        world.clone_components(src, dst).unwrap();
        assert_eq!(world.signature(dst), world.signature(src));
        assert_eq!(world.get_component::<Health>(dst).unwrap(), &Health(7));
        assert!(world.try_get_component::<Armor>(dst).is_none());
        assert_eq!(world.find_signature_drift(), None);
    }
}
