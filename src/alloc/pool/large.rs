/*!
 * Large Allocation Policy
 * Pass-through path for requests above the pool's largest size class
 */

use crate::alloc::types::MemoryBlock;
use crate::backend::{LaunchParams, Resource};
use crate::core::{AllocResult, BufferId, Size};
use std::sync::atomic::{AtomicU32, Ordering};

/// Pass-through allocation for oversized requests.
///
/// Blocks carry the large-alloc id flag so the deallocate path can route
/// them back here without touching the freelists.
pub trait LargeAllocPolicy<R: Resource>: Default + Send + Sync {
    fn allocate(
        &self,
        resource: &R,
        size: Size,
        alignment: Size,
        params: &LaunchParams,
    ) -> AllocResult<MemoryBlock>;

    fn deallocate(
        &self,
        resource: &R,
        block: &MemoryBlock,
        size: Size,
        alignment: Size,
        params: &LaunchParams,
    );
}

/// One backend allocation per large block
#[derive(Debug, Default)]
pub struct DirectLargeAlloc {
    next_seq: AtomicU32,
}

impl<R: Resource> LargeAllocPolicy<R> for DirectLargeAlloc {
    fn allocate(
        &self,
        resource: &R,
        size: Size,
        alignment: Size,
        _params: &LaunchParams,
    ) -> AllocResult<MemoryBlock> {
        let view = resource.allocate(size, alignment)?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryBlock::new(BufferId::large(seq), view))
    }

    fn deallocate(
        &self,
        resource: &R,
        block: &MemoryBlock,
        size: Size,
        alignment: Size,
        _params: &LaunchParams,
    ) {
        debug_assert!(block.is_large());
        resource.deallocate(block.view, size, alignment);
    }
}
