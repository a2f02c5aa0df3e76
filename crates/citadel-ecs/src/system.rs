//! Systems and signature-driven membership.
//!
//! A system declares a required [`Signature`]. Whenever an instance's
//! signature changes, the [`SystemRegistry`] re-checks every system and adds or
//! removes the handle so that
//! `handle ∈ system ⇔ (signature & required) == required` holds after each
//! component add/remove.
//!
//! Systems are generic over the context `C` they update against (the engine
//! facade in practice). During its update a system is checked out of the
//! registry; membership changes addressed to it meanwhile are queued and
//! replayed on check-in.

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::entity::InstanceHandle;
use crate::signature::Signature;
use crate::world::World;
use crate::EcsError;

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// Capability interface every system implements.
pub trait System<C>: Any {
    /// Called when `handle` starts or keeps qualifying. Must be idempotent.
    fn add_entity(&mut self, world: &World, handle: InstanceHandle);

    /// Called when `handle` stops qualifying or is destroyed. Must be
    /// idempotent.
    fn remove_entity(&mut self, world: &World, handle: InstanceHandle);

    /// Drop every member.
    fn remove_all(&mut self);

    /// Run one step against the context.
    fn update(&mut self, _ctx: &mut C, _dt: f32) {}

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Ordered member set most systems embed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySet {
    members: BTreeSet<InstanceHandle>,
}

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: InstanceHandle) -> bool {
        self.members.insert(handle)
    }

    pub fn remove(&mut self, handle: InstanceHandle) -> bool {
        self.members.remove(&handle)
    }

    pub fn contains(&self, handle: InstanceHandle) -> bool {
        self.members.contains(&handle)
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in handle order.
    pub fn iter(&self) -> impl Iterator<Item = InstanceHandle> + '_ {
        self.members.iter().copied()
    }

    /// Copy of the members, for iterating while the context is mutated.
    pub fn to_vec(&self) -> Vec<InstanceHandle> {
        self.members.iter().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// SystemId
// ---------------------------------------------------------------------------

/// Registration-order index of a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(pub u32);

// ---------------------------------------------------------------------------
// SystemRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Pending {
    Add(InstanceHandle),
    Remove(InstanceHandle),
    Clear,
}

struct SystemEntry<C> {
    name: &'static str,
    type_id: TypeId,
    required: Signature,
    /// `None` while checked out for its update.
    system: Option<Box<dyn System<C>>>,
    pending: Vec<Pending>,
}

impl<C: 'static> SystemEntry<C> {
    fn add(&mut self, world: &World, handle: InstanceHandle) {
        match self.system.as_mut() {
            Some(system) => system.add_entity(world, handle),
            None => self.pending.push(Pending::Add(handle)),
        }
    }

    fn remove(&mut self, world: &World, handle: InstanceHandle) {
        match self.system.as_mut() {
            Some(system) => system.remove_entity(world, handle),
            None => self.pending.push(Pending::Remove(handle)),
        }
    }
}

/// Owns every system, in registration order, with its required signature.
pub struct SystemRegistry<C> {
    entries: Vec<SystemEntry<C>>,
    by_type: HashMap<TypeId, usize>,
}

impl<C> fmt::Debug for SystemRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemRegistry")
            .field(
                "systems",
                &self.entries.iter().map(|e| (e.name, e.required)).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<C: 'static> SystemRegistry<C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_type: HashMap::new(),
        }
    }

    /// Register a system. Its required signature starts empty, which every
    /// instance matches; call [`set_signature`](Self::set_signature) next.
    pub fn register<S: System<C>>(&mut self, name: &'static str, system: S) -> Result<SystemId, EcsError> {
        let type_id = TypeId::of::<S>();
        if self.by_type.contains_key(&type_id) {
            return Err(EcsError::DuplicateSystem { name });
        }
        let id = SystemId(self.entries.len() as u32);
        self.entries.push(SystemEntry {
            name,
            type_id,
            required: Signature::EMPTY,
            system: Some(Box::new(system)),
            pending: Vec::new(),
        });
        self.by_type.insert(type_id, id.0 as usize);
        tracing::debug!(system = name, id = id.0, "registered system");
        Ok(id)
    }

    pub fn set_signature<S: System<C>>(&mut self, required: Signature) -> Result<(), EcsError> {
        let index = self.index_of::<S>()?;
        self.entries[index].required = required;
        Ok(())
    }

    pub fn signature_of<S: System<C>>(&self) -> Result<Signature, EcsError> {
        self.index_of::<S>().map(|i| self.entries[i].required)
    }

    pub fn id_of<S: System<C>>(&self) -> Result<SystemId, EcsError> {
        self.index_of::<S>().map(|i| SystemId(i as u32))
    }

    fn index_of<S: System<C>>(&self) -> Result<usize, EcsError> {
        self.by_type
            .get(&TypeId::of::<S>())
            .copied()
            .ok_or(EcsError::UnregisteredSystem {
                type_name: std::any::type_name::<S>(),
            })
    }

    /// Borrow a registered system.
    ///
    /// Fails with [`EcsError::UnregisteredSystem`] if `S` is unknown, and with
    /// [`EcsError::SystemBusy`] while `S` is checked out for its own update.
    pub fn get<S: System<C>>(&self) -> Result<&S, EcsError> {
        let entry = &self.entries[self.index_of::<S>()?];
        entry
            .system
            .as_ref()
            .and_then(|s| s.as_any().downcast_ref::<S>())
            .ok_or(EcsError::SystemBusy { name: entry.name })
    }

    pub fn get_mut<S: System<C>>(&mut self) -> Result<&mut S, EcsError> {
        let index = self.index_of::<S>()?;
        let entry = &mut self.entries[index];
        let name = entry.name;
        entry
            .system
            .as_mut()
            .and_then(|s| s.as_any_mut().downcast_mut::<S>())
            .ok_or(EcsError::SystemBusy { name })
    }

    /// Re-evaluate every system's membership for `handle`.
    ///
    /// Runs unconditionally; add and remove are idempotent on the system side.
    pub fn on_signature_changed(&mut self, world: &World, handle: InstanceHandle, signature: Signature) {
        for entry in &mut self.entries {
            if signature.matches(entry.required) {
                entry.add(world, handle);
            } else {
                entry.remove(world, handle);
            }
        }
    }

    /// Remove `handle` from every system.
    pub fn on_instance_destroyed(&mut self, world: &World, handle: InstanceHandle) {
        for entry in &mut self.entries {
            entry.remove(world, handle);
        }
    }

    /// Empty every system.
    pub fn clear_all(&mut self) {
        for entry in &mut self.entries {
            match entry.system.as_mut() {
                Some(system) => system.remove_all(),
                None => entry.pending.push(Pending::Clear),
            }
        }
    }

    /// Take the system at `index` out for its update.
    pub fn check_out(&mut self, index: usize) -> Option<Box<dyn System<C>>> {
        self.entries.get_mut(index)?.system.take()
    }

    /// Put a checked-out system back and replay queued membership changes.
    pub fn check_in(&mut self, world: &World, index: usize, mut system: Box<dyn System<C>>) {
        let entry = &mut self.entries[index];
        debug_assert_eq!(entry.type_id, system.as_any().type_id());
        for pending in entry.pending.drain(..) {
            match pending {
                Pending::Add(handle) => system.add_entity(world, handle),
                Pending::Remove(handle) => system.remove_entity(world, handle),
                Pending::Clear => system.remove_all(),
            }
        }
        entry.system = Some(system);
    }

    pub fn name_at(&self, index: usize) -> Option<&'static str> {
        self.entries.get(index).map(|e| e.name)
    }

    /// Names in registration (= update) order.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: 'static> Default for SystemRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
