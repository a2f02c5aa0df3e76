//! Component type registration and dense per-type storage.
//!
//! Every component type must be registered in a [`ComponentRegistry`] before
//! first use. Registration hands out the next free signature bit, so the
//! order of registration is the order of bits, and at most
//! [`MAX_COMPONENT_TYPES`] types can ever be registered.
//!
//! Each registered type owns one [`ComponentStore`]: a packed `Vec<T>` with a
//! bidirectional handle/index map. Removal swaps the last element into the
//! hole, so indices `[0, len)` are always exactly the live components.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use crate::entity::InstanceHandle;
use crate::signature::{Signature, MAX_COMPONENT_TYPES};
use crate::EcsError;

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Registration-order id of a component type; doubles as its signature bit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

/// Bound satisfied by every storable component type.
pub trait Component: Clone + 'static {}

impl<T: Clone + 'static> Component for T {}

// ---------------------------------------------------------------------------
// ComponentStore
// ---------------------------------------------------------------------------

/// Packed storage for one component type.
#[derive(Debug, Clone)]
pub struct ComponentStore<T> {
    name: &'static str,
    dense: Vec<T>,
    /// index -> owning handle
    owners: Vec<InstanceHandle>,
    /// owning handle -> index
    indices: HashMap<InstanceHandle, usize>,
}

impl<T: Component> ComponentStore<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            dense: Vec::new(),
            owners: Vec::new(),
            indices: HashMap::new(),
        }
    }

    /// Name given at registration, used in diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Append `value` for `handle`.
    pub fn insert(&mut self, handle: InstanceHandle, value: T) -> Result<&mut T, EcsError> {
        if self.indices.contains_key(&handle) {
            return Err(EcsError::DuplicateComponent {
                handle,
                component: self.name,
            });
        }
        let index = self.dense.len();
        self.dense.push(value);
        self.owners.push(handle);
        self.indices.insert(handle, index);
        Ok(&mut self.dense[index])
    }

    /// Remove and return `handle`'s component, keeping the array packed.
    pub fn remove(&mut self, handle: InstanceHandle) -> Result<T, EcsError> {
        self.try_remove(handle).ok_or(EcsError::ComponentNotFound {
            handle,
            component: self.name,
        })
    }

    pub fn try_remove(&mut self, handle: InstanceHandle) -> Option<T> {
        let index = self.indices.remove(&handle)?;
        let value = self.dense.swap_remove(index);
        self.owners.swap_remove(index);
        // The former last element now sits in the hole.
        if let Some(&moved) = self.owners.get(index) {
            self.indices.insert(moved, index);
        }
        Some(value)
    }

    pub fn get(&self, handle: InstanceHandle) -> Result<&T, EcsError> {
        self.try_get(handle).ok_or(EcsError::ComponentNotFound {
            handle,
            component: self.name,
        })
    }

    pub fn get_mut(&mut self, handle: InstanceHandle) -> Result<&mut T, EcsError> {
        let name = self.name;
        self.try_get_mut(handle)
            .ok_or(EcsError::ComponentNotFound { handle, component: name })
    }

    #[inline]
    pub fn try_get(&self, handle: InstanceHandle) -> Option<&T> {
        self.indices.get(&handle).map(|&i| &self.dense[i])
    }

    #[inline]
    pub fn try_get_mut(&mut self, handle: InstanceHandle) -> Option<&mut T> {
        let index = *self.indices.get(&handle)?;
        Some(&mut self.dense[index])
    }

    /// Copy `source`'s value into a new entry owned by `dest`.
    ///
    /// The copy belongs to `dest` from the moment it is inserted; nothing of
    /// `source`'s ownership carries over.
    pub fn copy_to(
        &mut self,
        source: InstanceHandle,
        dest: InstanceHandle,
    ) -> Result<&mut T, EcsError> {
        let value = self.get(source)?.clone();
        self.insert(dest, value)
    }

    #[inline]
    pub fn contains(&self, handle: InstanceHandle) -> bool {
        self.indices.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Owner of each packed index.
    pub fn handles(&self) -> &[InstanceHandle] {
        &self.owners
    }

    pub fn values(&self) -> &[T] {
        &self.dense
    }

    pub fn iter(&self) -> impl Iterator<Item = (InstanceHandle, &T)> + '_ {
        self.owners.iter().copied().zip(self.dense.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (InstanceHandle, &mut T)> + '_ {
        self.owners.iter().copied().zip(self.dense.iter_mut())
    }

    /// Index of `handle`'s component in the packed array.
    pub fn index_of(&self, handle: InstanceHandle) -> Option<usize> {
        self.indices.get(&handle).copied()
    }
}

// ---------------------------------------------------------------------------
// Type-erased store access
// ---------------------------------------------------------------------------

/// Operations the registry runs across every store without knowing `T`.
trait ErasedStore: Any {
    fn name(&self) -> &'static str;
    fn contains(&self, handle: InstanceHandle) -> bool;
    /// Best-effort removal; `false` when nothing was stored.
    fn discard(&mut self, handle: InstanceHandle) -> bool;
    /// Clone `source`'s value to `dest` if present; `Ok(false)` when absent.
    fn clone_between(&mut self, source: InstanceHandle, dest: InstanceHandle)
        -> Result<bool, EcsError>;
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedStore for ComponentStore<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn contains(&self, handle: InstanceHandle) -> bool {
        ComponentStore::contains(self, handle)
    }

    fn discard(&mut self, handle: InstanceHandle) -> bool {
        self.try_remove(handle).is_some()
    }

    fn clone_between(
        &mut self,
        source: InstanceHandle,
        dest: InstanceHandle,
    ) -> Result<bool, EcsError> {
        if !ComponentStore::contains(self, source) {
            return Ok(false);
        }
        self.copy_to(source, dest).map(|_| true)
    }

    fn len(&self) -> usize {
        ComponentStore::len(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Maps Rust types to [`ComponentTypeId`]s and owns one store per type.
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentTypeId>,
    /// Indexed by `ComponentTypeId.0`.
    stores: Vec<Box<dyn ErasedStore>>,
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("types", &self.names())
            .finish()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            by_type: HashMap::new(),
            stores: Vec::new(),
        }
    }

    /// Register `T` under `name`, assigning the next signature bit.
    pub fn register<T: Component>(&mut self, name: &'static str) -> Result<ComponentTypeId, EcsError> {
        let type_id = TypeId::of::<T>();
        if self.by_type.contains_key(&type_id) {
            return Err(EcsError::DuplicateRegistration { name });
        }
        if self.stores.len() >= MAX_COMPONENT_TYPES {
            return Err(EcsError::SignatureCapacity {
                name,
                limit: MAX_COMPONENT_TYPES,
            });
        }
        let id = ComponentTypeId(self.stores.len() as u32);
        self.stores.push(Box::new(ComponentStore::<T>::new(name)));
        self.by_type.insert(type_id, id);
        tracing::debug!(component = name, bit = id.0, "registered component type");
        Ok(id)
    }

    pub fn id_of<T: Component>(&self) -> Result<ComponentTypeId, EcsError> {
        self.lookup::<T>().ok_or(EcsError::UnregisteredComponent {
            type_name: std::any::type_name::<T>(),
        })
    }

    pub fn lookup<T: Component>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Single-bit signature for `T`.
    pub fn signature_of<T: Component>(&self) -> Result<Signature, EcsError> {
        self.id_of::<T>().map(|id| Signature::EMPTY.with(id))
    }

    pub fn store<T: Component>(&self) -> Result<&ComponentStore<T>, EcsError> {
        let id = self.id_of::<T>()?;
        Ok(self.stores[id.0 as usize]
            .as_any()
            .downcast_ref::<ComponentStore<T>>()
            .expect("store type matches its TypeId key"))
    }

    pub fn store_mut<T: Component>(&mut self) -> Result<&mut ComponentStore<T>, EcsError> {
        let id = self.id_of::<T>()?;
        Ok(self.stores[id.0 as usize]
            .as_any_mut()
            .downcast_mut::<ComponentStore<T>>()
            .expect("store type matches its TypeId key"))
    }

    /// Store lookup that treats an unregistered type as a soft miss.
    pub fn try_store<T: Component>(&self) -> Option<&ComponentStore<T>> {
        let id = self.lookup::<T>()?;
        self.stores[id.0 as usize].as_any().downcast_ref()
    }

    pub fn contains(&self, id: ComponentTypeId, handle: InstanceHandle) -> bool {
        self.stores
            .get(id.0 as usize)
            .is_some_and(|store| store.contains(handle))
    }

    /// Remove every component `handle` owns; absence is not an error.
    ///
    /// Returns how many components were removed.
    pub fn entity_destroyed(&mut self, handle: InstanceHandle) -> usize {
        self.stores
            .iter_mut()
            .map(|store| store.discard(handle))
            .filter(|&removed| removed)
            .count()
    }

    /// Clone every component `source` owns onto `dest`.
    ///
    /// Returns the signature of the cloned set. Stops at the first store where
    /// `dest` already owns the type.
    pub fn clone_all(
        &mut self,
        source: InstanceHandle,
        dest: InstanceHandle,
    ) -> Result<Signature, EcsError> {
        let mut cloned = Signature::EMPTY;
        for (bit, store) in self.stores.iter_mut().enumerate() {
            if store.clone_between(source, dest)? {
                cloned.set(ComponentTypeId(bit as u32));
            }
        }
        Ok(cloned)
    }

    /// Signature derived from store membership rather than any cache.
    pub fn recompute_signature(&self, handle: InstanceHandle) -> Signature {
        let mut sig = Signature::EMPTY;
        for (bit, store) in self.stores.iter().enumerate() {
            if store.contains(handle) {
                sig.set(ComponentTypeId(bit as u32));
            }
        }
        sig
    }

    pub fn name_of(&self, id: ComponentTypeId) -> Option<&'static str> {
        self.stores.get(id.0 as usize).map(|s| s.name())
    }

    /// Registered names in bit order.
    pub fn names(&self) -> Vec<&'static str> {
        self.stores.iter().map(|s| s.name()).collect()
    }

    /// Number of stored components of type `id`.
    pub fn count(&self, id: ComponentTypeId) -> usize {
        self.stores.get(id.0 as usize).map_or(0, |s| s.len())
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Vel {
        dx: f32,
    }

    fn h(i: u32) -> InstanceHandle {
        InstanceHandle::new(i, 0)
    }

    #[test]
    fn insert_then_get() {
        let mut store = ComponentStore::new("pos");
        store.insert(h(1), Pos { x: 1.0, y: 2.0 }).unwrap();
        assert_eq!(store.try_get(h(1)), Some(&Pos { x: 1.0, y: 2.0 }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut store = ComponentStore::new("pos");
        store.insert(h(1), Pos { x: 0.0, y: 0.0 }).unwrap();
        let err = store.insert(h(1), Pos { x: 9.0, y: 9.0 }).unwrap_err();
        assert!(matches!(err, EcsError::DuplicateComponent { component: "pos", .. }));
        // The original value survives.
        assert_eq!(store.try_get(h(1)), Some(&Pos { x: 0.0, y: 0.0 }));
    }

    #[test]
    fn remove_swaps_last_into_hole() {
        let mut store = ComponentStore::new("pos");
        for i in 0..4 {
            store.insert(h(i), Pos { x: i as f32, y: 0.0 }).unwrap();
        }
        let removed = store.remove(h(1)).unwrap();
        assert_eq!(removed.x, 1.0);
        assert_eq!(store.handles(), &[h(0), h(3), h(2)]);
        assert_eq!(store.index_of(h(3)), Some(1));
        assert_eq!(store.try_get(h(3)).unwrap().x, 3.0);
    }

    #[test]
    fn remove_missing_is_an_error_and_try_remove_is_not() {
        let mut store: ComponentStore<Pos> = ComponentStore::new("pos");
        assert!(matches!(
            store.remove(h(5)),
            Err(EcsError::ComponentNotFound { .. })
        ));
        assert!(store.try_remove(h(5)).is_none());
    }

    #[test]
    fn copy_to_gives_dest_its_own_copy() {
        let mut store = ComponentStore::new("pos");
        store.insert(h(1), Pos { x: 4.0, y: 5.0 }).unwrap();
        store.copy_to(h(1), h(2)).unwrap();
        store.get_mut(h(2)).unwrap().x = 100.0;
        assert_eq!(store.get(h(1)).unwrap().x, 4.0);
        assert_eq!(store.get(h(2)).unwrap().x, 100.0);
        let owner_of_copy = store.handles()[store.index_of(h(2)).unwrap()];
        assert_eq!(owner_of_copy, h(2));
    }

    #[test]
    fn iter_mut_writes_through_to_packed_values() {
        let mut store = ComponentStore::new("pos");
        for i in 0..3 {
            store.insert(h(i), Pos { x: i as f32, y: 0.0 }).unwrap();
        }
        store.remove(h(0)).unwrap();
        for (handle, pos) in store.iter_mut() {
            pos.y = handle.index() as f32 * 10.0;
        }
        let ys: Vec<f32> = store.values().iter().map(|p| p.y).collect();
        assert_eq!(ys, vec![20.0, 10.0]);
        assert_eq!(store.handles(), &[h(2), h(1)]);
    }

    #[test]
    fn registration_assigns_bits_in_order() {
        let mut reg = ComponentRegistry::new();
        let p = reg.register::<Pos>("pos").unwrap();
        let v = reg.register::<Vel>("vel").unwrap();
        assert_eq!(p.index(), 0);
        assert_eq!(v.index(), 1);
        assert_eq!(reg.names(), vec!["pos", "vel"]);
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let mut reg = ComponentRegistry::new();
        reg.register::<Pos>("pos").unwrap();
        assert!(matches!(
            reg.register::<Pos>("pos_again"),
            Err(EcsError::DuplicateRegistration { name: "pos_again" })
        ));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn thirty_third_type_exceeds_capacity() {
        struct Marker<const N: usize>;
        impl<const N: usize> Clone for Marker<N> {
            fn clone(&self) -> Self {
                Marker
            }
        }

        macro_rules! register_all {
            ($reg:ident; $($n:literal)*) => {
                $( $reg.register::<Marker<$n>>("marker").unwrap(); )*
            };
        }

        let mut reg = ComponentRegistry::new();
        register_all!(reg; 0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
            16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31);
        assert_eq!(reg.len(), MAX_COMPONENT_TYPES);
        assert!(matches!(
            reg.register::<Marker<32>>("overflow"),
            Err(EcsError::SignatureCapacity { limit: 32, .. })
        ));
    }

    #[test]
    fn unregistered_type_lookup() {
        let reg = ComponentRegistry::new();
        assert!(matches!(
            reg.store::<Pos>(),
            Err(EcsError::UnregisteredComponent { .. })
        ));
        assert!(reg.try_store::<Pos>().is_none());
    }

    #[test]
    fn entity_destroyed_and_clone_all() {
        let mut reg = ComponentRegistry::new();
        let p = reg.register::<Pos>("pos").unwrap();
        let v = reg.register::<Vel>("vel").unwrap();
        reg.store_mut::<Pos>().unwrap().insert(h(0), Pos { x: 1.0, y: 1.0 }).unwrap();
        reg.store_mut::<Vel>().unwrap().insert(h(0), Vel { dx: 2.0 }).unwrap();

        let sig = reg.clone_all(h(0), h(1)).unwrap();
        assert_eq!(sig, Signature::of(&[p, v]));
        assert_eq!(reg.recompute_signature(h(1)), sig);

        assert_eq!(reg.entity_destroyed(h(0)), 2);
        assert_eq!(reg.entity_destroyed(h(0)), 0);
        assert!(!reg.contains(p, h(0)));
        assert!(reg.contains(p, h(1)));
    }
}
