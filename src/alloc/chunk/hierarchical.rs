/*!
 * Hierarchical Chunk Locator
 * One chunk = one slot of the hierarchical allocator
 */

use super::ChunkLocator;
use crate::alloc::hierarchical::HierarchicalSlotAllocator;
use crate::alloc::types::MemoryBlock;
use crate::backend::HeapOps;
use crate::core::{AllocResult, BufferId, Size};
use std::sync::Arc;

/// Chunk locator serving chunks from a shared hierarchical allocator.
///
/// Chunk ids encode `(layer, slot)`; the `used`/`pending` counters live on
/// the slot itself, so the allocator's merge logic sees them directly.
#[derive(Clone)]
pub struct HierarchicalChunkLocator<H: HeapOps> {
    allocator: Arc<HierarchicalSlotAllocator<H>>,
}

impl<H: HeapOps> HierarchicalChunkLocator<H> {
    pub fn new(allocator: Arc<HierarchicalSlotAllocator<H>>) -> Self {
        Self { allocator }
    }

    pub fn allocator(&self) -> &Arc<HierarchicalSlotAllocator<H>> {
        &self.allocator
    }
}

impl<H: HeapOps> ChunkLocator for HierarchicalChunkLocator<H> {
    fn add_chunk(&self, size: Size, _alignment: Size) -> AllocResult<MemoryBlock> {
        // Slot placement fixes alignment to the level granularity.
        self.allocator.chunk_acquire(size)
    }

    fn release_chunk(&self, id: BufferId) -> bool {
        self.allocator.chunk_release(id)
    }

    fn find_chunk_size(&self, id: BufferId) -> Size {
        self.allocator.chunk_size_of(id)
    }

    fn is_alive(&self, id: BufferId) -> bool {
        self.allocator.chunk_is_alive(id)
    }

    fn increment_used(&self, id: BufferId) {
        self.allocator.chunk_adjust(id, |used, _| *used += 1);
    }

    fn decrement_used(&self, id: BufferId) {
        self.allocator
            .chunk_adjust(id, |used, _| *used = used.saturating_sub(1));
    }

    fn increment_pending(&self, id: BufferId) {
        self.allocator.chunk_adjust(id, |_, pending| *pending += 1);
    }

    fn decrement_pending(&self, id: BufferId) {
        self.allocator
            .chunk_adjust(id, |_, pending| *pending = pending.saturating_sub(1));
    }

    fn decrement_pending_and_used(&self, id: BufferId) {
        self.allocator.chunk_adjust(id, |used, pending| {
            *used = used.saturating_sub(1);
            *pending = pending.saturating_sub(1);
        });
    }
}
