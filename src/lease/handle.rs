/*!
 * Generation-Tagged Handles
 * Lightweight pool indices with stale-reference detection
 */

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Pool handle: 32-bit slot index plus 16-bit generation.
///
/// The generation is compared against the slot's current generation on every
/// non-trivial operation; a mismatch means the slot was released and reused
/// since this handle was issued. The invalid handle uses the maximum index.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Handle<T> {
    index: u32,
    generation: u16,
    #[serde(skip)]
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub const INVALID_INDEX: u32 = u32::MAX;

    #[inline]
    pub const fn new(index: u32, generation: u16) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn invalid() -> Self {
        Self::new(Self::INVALID_INDEX, u16::MAX)
    }

    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.index != Self::INVALID_INDEX
    }

    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(&self) -> u16 {
        self.generation
    }
}

// Manual impls: the tag type is phantom and must not constrain derives.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "Handle({}, gen {})", self.index, self.generation)
        } else {
            write!(f, "Handle(invalid)")
        }
    }
}
