/*!
 * Backend Traits
 * Heap and resource abstractions required by the allocator
 */

use super::types::{BufferView, HeapRegion, ReuseToken};
use crate::core::{AllocResult, Size};

/// Low-level virtual-address operations, required by the hierarchical
/// allocator.
///
/// Reservation and mapping are distinct: a reserved range carries no physical
/// pages until mapped. `reserve(0)` returns the empty region; `map`/`unmap`
/// on empty inputs are no-ops.
pub trait HeapOps: Send + Sync {
    /// Reserve a virtual-address range without backing pages
    fn reserve(&self, size: Size) -> AllocResult<HeapRegion>;

    /// Bind physical pages to a reserved range.
    ///
    /// The returned view's address equals the region's base and its size the
    /// region's size.
    fn map(&self, region: HeapRegion) -> AllocResult<BufferView>;

    /// Unbind pages and release the range
    fn unmap(&self, view: BufferView, size: Size) -> AllocResult<()>;
}

/// Raw allocation interface, required by the segregated pool and the direct
/// chunk locator.
///
/// `allocate(0, _)` returns the empty view; `deallocate` on an empty view is
/// a no-op.
pub trait Resource: Send + Sync {
    fn allocate(&self, size: Size, alignment: Size) -> AllocResult<BufferView>;

    fn deallocate(&self, view: BufferView, size: Size, alignment: Size);

    /// Derive a sub-view at `offset` within `base`
    fn make_view(&self, base: BufferView, offset: Size, size: Size) -> BufferView {
        base.slice(offset, size)
    }

    /// Whether the work guarded by `token` has completed on the backend
    fn is_completed(&self, token: &ReuseToken) -> bool;
}
