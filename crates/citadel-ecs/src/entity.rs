//! Instance handles and the fixed-capacity instance pool.
//!
//! An [`InstanceHandle`] packs a *generation* counter in the high 32 bits and a
//! slot *index* in the low 32 bits. The generation is bumped every time a slot
//! is released, so a handle kept past its instance's lifetime is detected as
//! stale instead of silently aliasing the slot's next occupant.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::signature::Signature;
use crate::transform::{Aabb, Transform};
use crate::EcsError;

// ---------------------------------------------------------------------------
// InstanceHandle
// ---------------------------------------------------------------------------

/// A generational instance handle.
///
/// Layout: `[generation: u32 | index: u32]`. Handles are plain values: copy,
/// compare and hash them freely, and resolve them through the pool.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceHandle(u64);

impl InstanceHandle {
    /// Sentinel that never refers to a live instance.
    pub const INVALID: InstanceHandle = InstanceHandle(u64::MAX);

    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// The slot index (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl Default for InstanceHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "InstanceHandle({}v{})", self.index(), self.generation())
        } else {
            f.write_str("InstanceHandle(INVALID)")
        }
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}v{}", self.index(), self.generation())
        } else {
            f.write_str("invalid")
        }
    }
}

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

/// A live simulation object: pose, local bound and cached signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    handle: InstanceHandle,
    pub transform: Transform,
    /// Object-local bound.
    pub bound: Aabb,
    pub(crate) signature: Signature,
}

impl Instance {
    pub fn handle(&self) -> InstanceHandle {
        self.handle
    }

    /// Components currently owned, as cached by the world.
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// World-space bound of the transformed local bound.
    pub fn world_bound(&self) -> Aabb {
        self.bound.transformed(&self.transform.to_affine())
    }

    /// World-space bound expressed relative to the translation, which is the
    /// shape the spatial grid stores.
    pub fn relative_bound(&self) -> Aabb {
        self.world_bound().translated(-self.transform.translation)
    }
}

// ---------------------------------------------------------------------------
// InstancePool
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Slot {
    generation: u32,
    /// Position of this slot in `live` while occupied.
    dense: u32,
    instance: Option<Instance>,
}

/// Allocates and recycles instance slots up to a fixed capacity.
///
/// Live handles are kept in a dense array so iteration never touches dead
/// slots; release swaps the last live handle into the vacated position.
/// Free slots are reused in FIFO order so generations spread over the pool.
#[derive(Debug)]
pub struct InstancePool {
    slots: Vec<Slot>,
    live: Vec<InstanceHandle>,
    free: VecDeque<u32>,
    capacity: usize,
}

impl InstancePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            live: Vec::with_capacity(capacity),
            free: VecDeque::new(),
            capacity,
        }
    }

    /// Allocate a slot and place a fresh instance in it.
    ///
    /// Fails with [`EcsError::PoolExhausted`] once `capacity` instances are live.
    pub fn create(&mut self, transform: Transform, bound: Aabb) -> Result<InstanceHandle, EcsError> {
        let index = match self.free.pop_front() {
            Some(index) => index,
            None if self.slots.len() < self.capacity => {
                self.slots.push(Slot {
                    generation: 0,
                    dense: 0,
                    instance: None,
                });
                (self.slots.len() - 1) as u32
            }
            None => {
                return Err(EcsError::PoolExhausted {
                    capacity: self.capacity,
                })
            }
        };

        let slot = &mut self.slots[index as usize];
        let handle = InstanceHandle::new(index, slot.generation);
        slot.dense = self.live.len() as u32;
        slot.instance = Some(Instance {
            handle,
            transform,
            bound,
            signature: Signature::EMPTY,
        });
        self.live.push(handle);
        Ok(handle)
    }

    /// Return a slot to the free list, invalidating outstanding handles.
    ///
    /// Returns `false` if the handle was stale or never allocated.
    pub fn release(&mut self, handle: InstanceHandle) -> bool {
        if !self.is_live(handle) {
            return false;
        }
        let slot = &mut self.slots[handle.index() as usize];
        let dense = slot.dense as usize;
        slot.instance = None;
        slot.generation = slot.generation.wrapping_add(1);

        self.live.swap_remove(dense);
        if let Some(&moved) = self.live.get(dense) {
            self.slots[moved.index() as usize].dense = dense as u32;
        }
        self.free.push_back(handle.index());
        true
    }

    /// `true` while the handle's slot holds the instance it was issued for.
    pub fn is_live(&self, handle: InstanceHandle) -> bool {
        self.slots
            .get(handle.index() as usize)
            .is_some_and(|slot| slot.instance.is_some() && slot.generation == handle.generation())
    }

    pub fn get(&self, handle: InstanceHandle) -> Result<&Instance, EcsError> {
        self.try_get(handle)
            .ok_or(EcsError::StaleInstance { handle })
    }

    pub fn get_mut(&mut self, handle: InstanceHandle) -> Result<&mut Instance, EcsError> {
        self.try_get_mut(handle)
            .ok_or(EcsError::StaleInstance { handle })
    }

    pub fn try_get(&self, handle: InstanceHandle) -> Option<&Instance> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.instance.as_ref()
    }

    pub fn try_get_mut(&mut self, handle: InstanceHandle) -> Option<&mut Instance> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.instance.as_mut()
    }

    /// Dense view of every live handle, in allocation/swap order.
    pub fn live_handles(&self) -> &[InstanceHandle] {
        &self.live
    }

    /// Iterate live instances densely.
    pub fn iter(&self) -> impl Iterator<Item = &Instance> + '_ {
        self.live.iter().filter_map(move |h| self.try_get(*h))
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
