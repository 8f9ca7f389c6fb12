/*!
 * Backend Types
 * Views, regions, and completion tokens shared by all backends
 */

use crate::core::{Address, Size};
use serde::{Deserialize, Serialize};

/// Non-owning descriptor of a contiguous memory region.
///
/// `addr` is the absolute address of the first byte, `offset` the byte
/// distance from the owning chunk's base. A view with `addr == 0` is null;
/// a view with `size == 0` is empty; both are invalid. The constructor
/// invariant is `offset + size <= chunk_size` at every construction site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferView {
    pub addr: Address,
    pub offset: Size,
    pub size: Size,
}

impl BufferView {
    pub const fn new(addr: Address, offset: Size, size: Size) -> Self {
        Self { addr, offset, size }
    }

    /// The null-and-empty view
    pub const fn empty() -> Self {
        Self {
            addr: 0,
            offset: 0,
            size: 0,
        }
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.addr == 0
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Valid means neither null nor empty
    #[inline]
    pub const fn is_valid(&self) -> bool {
        !self.is_null() && !self.is_empty()
    }

    /// Sub-view at `offset` within this view; offsets accumulate
    pub fn slice(&self, offset: Size, size: Size) -> Self {
        debug_assert!(offset + size <= self.size);
        Self {
            addr: self.addr + offset,
            offset: self.offset + offset,
            size,
        }
    }

    /// Base address of the owning chunk
    #[inline]
    pub const fn chunk_base(&self) -> Address {
        self.addr - self.offset
    }
}

/// A reserved but not necessarily mapped virtual-address range.
///
/// Created by `HeapOps::reserve`; released by `HeapOps::unmap` after the
/// region has been mapped and drained, or by unmap-without-map on teardown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapRegion {
    pub addr: Address,
    pub size: Size,
}

impl HeapRegion {
    pub const fn new(addr: Address, size: Size) -> Self {
        Self { addr, size }
    }

    pub const fn empty() -> Self {
        Self { addr: 0, size: 0 }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Opaque backend-specific completion marker.
///
/// The payload is a backend serial (command-buffer number, event id, ...).
/// Tokens are only meaningful to the backend that issued them and must never
/// be compared across backends; query through `Resource::is_completed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReuseToken(pub u64);

impl ReuseToken {
    pub const fn new(serial: u64) -> Self {
        Self(serial)
    }
}

/// Submission context accompanying allocate/deallocate calls.
///
/// Carries the device/stream the caller is working against and the completion
/// token guarding asynchronous frees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchParams {
    pub device: u32,
    pub stream: u64,
    pub token: ReuseToken,
}

impl LaunchParams {
    pub fn with_token(token: ReuseToken) -> Self {
        Self {
            token,
            ..Self::default()
        }
    }
}
