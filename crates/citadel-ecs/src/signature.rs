//! Fixed-capacity component signatures.
//!
//! Bit `i` of a [`Signature`] is set when the instance owns the component type
//! registered with id `i`. Systems declare a required signature and accept an
//! instance when every required bit is present.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};

use crate::component::ComponentTypeId;

/// Maximum number of distinct component types for the lifetime of a registry.
pub const MAX_COMPONENT_TYPES: usize = 32;

/// A 32-bit component membership mask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Signature(u32);

impl Signature {
    pub const EMPTY: Signature = Signature(0);

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build a signature from a list of component ids.
    pub fn of(ids: &[ComponentTypeId]) -> Self {
        ids.iter().fold(Self::EMPTY, |sig, id| sig.with(*id))
    }

    #[inline]
    pub fn with(mut self, id: ComponentTypeId) -> Self {
        self.set(id);
        self
    }

    #[inline]
    pub fn set(&mut self, id: ComponentTypeId) {
        self.0 |= 1 << id.index();
    }

    #[inline]
    pub fn reset(&mut self, id: ComponentTypeId) {
        self.0 &= !(1 << id.index());
    }

    #[inline]
    pub fn test(self, id: ComponentTypeId) -> bool {
        self.0 & (1 << id.index()) != 0
    }

    /// `true` when every bit of `required` is also set in `self`.
    #[inline]
    pub fn matches(self, required: Signature) -> bool {
        self.0 & required.0 == required.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Iterate the ids of the set bits, lowest first.
    pub fn ids(self) -> impl Iterator<Item = ComponentTypeId> {
        (0..MAX_COMPONENT_TYPES as u32)
            .filter(move |bit| self.0 & (1 << bit) != 0)
            .map(ComponentTypeId)
    }
}

impl BitAnd for Signature {
    type Output = Signature;
    fn bitand(self, rhs: Self) -> Self {
        Signature(self.0 & rhs.0)
    }
}

impl BitAndAssign for Signature {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl BitOr for Signature {
    type Output = Signature;
    fn bitor(self, rhs: Self) -> Self {
        Signature(self.0 | rhs.0)
    }
}

impl BitOrAssign for Signature {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({:#034b})", self.0)
    }
}
