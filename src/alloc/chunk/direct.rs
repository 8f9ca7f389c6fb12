/*!
 * Direct Chunk Locator
 * One chunk = one raw backend allocation
 */

use super::ChunkLocator;
use crate::alloc::types::MemoryBlock;
use crate::backend::Resource;
use crate::core::{AllocError, AllocResult, BufferId, Size};
use ahash::RandomState;
use dashmap::DashMap;
use log::warn;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct DirectChunk {
    view: crate::backend::BufferView,
    size: Size,
    alignment: Size,
    used: u32,
    pending: u32,
}

/// Chunk locator backed directly by `Resource::allocate`.
///
/// Chunks are keyed by a monotone id; reference counts live in the table
/// entry and `release_chunk` deallocates only once both reach zero.
#[derive(Debug)]
pub struct DirectChunkLocator<R: Resource> {
    resource: Arc<R>,
    chunks: DashMap<u32, DirectChunk, RandomState>,
    next_id: AtomicU32,
}

impl<R: Resource> DirectChunkLocator<R> {
    pub fn new(resource: Arc<R>) -> Self {
        Self {
            resource,
            chunks: DashMap::with_hasher(RandomState::new()),
            next_id: AtomicU32::new(0),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn entry_key(id: BufferId) -> Option<u32> {
        (id.is_valid() && !id.is_large()).then(|| id.raw())
    }
}

impl<R: Resource> ChunkLocator for DirectChunkLocator<R> {
    fn add_chunk(&self, size: Size, alignment: Size) -> AllocResult<MemoryBlock> {
        let view = self.resource.allocate(size, alignment)?;
        let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
        if raw > BufferId::MAX_DIRECT {
            self.resource.deallocate(view, size, alignment);
            return Err(AllocError::OutOfRange(
                "direct chunk locator: id space exhausted".into(),
            ));
        }
        let id = BufferId::direct(raw);
        self.chunks.insert(
            raw,
            DirectChunk {
                view,
                size,
                alignment,
                used: 0,
                pending: 0,
            },
        );
        Ok(MemoryBlock::new(id, view))
    }

    fn release_chunk(&self, id: BufferId) -> bool {
        let Some(key) = Self::entry_key(id) else {
            return false;
        };
        // Remove only when drained; a conditional remove keeps the check and
        // the deallocation atomic with respect to other threads.
        let removed = self
            .chunks
            .remove_if(&key, |_, chunk| chunk.used == 0 && chunk.pending == 0);
        match removed {
            Some((_, chunk)) => {
                self.resource.deallocate(chunk.view, chunk.size, chunk.alignment);
                true
            }
            None => false,
        }
    }

    fn find_chunk_size(&self, id: BufferId) -> Size {
        Self::entry_key(id)
            .and_then(|key| self.chunks.get(&key).map(|chunk| chunk.size))
            .unwrap_or(0)
    }

    fn is_alive(&self, id: BufferId) -> bool {
        Self::entry_key(id).is_some_and(|key| self.chunks.contains_key(&key))
    }

    fn increment_used(&self, id: BufferId) {
        if let Some(key) = Self::entry_key(id) {
            if let Some(mut chunk) = self.chunks.get_mut(&key) {
                chunk.used += 1;
            }
        }
    }

    fn decrement_used(&self, id: BufferId) {
        if let Some(key) = Self::entry_key(id) {
            if let Some(mut chunk) = self.chunks.get_mut(&key) {
                chunk.used = chunk.used.saturating_sub(1);
            }
        }
    }

    fn increment_pending(&self, id: BufferId) {
        if let Some(key) = Self::entry_key(id) {
            if let Some(mut chunk) = self.chunks.get_mut(&key) {
                chunk.pending += 1;
            }
        }
    }

    fn decrement_pending(&self, id: BufferId) {
        if let Some(key) = Self::entry_key(id) {
            if let Some(mut chunk) = self.chunks.get_mut(&key) {
                chunk.pending = chunk.pending.saturating_sub(1);
            }
        }
    }

    fn decrement_pending_and_used(&self, id: BufferId) {
        if let Some(key) = Self::entry_key(id) {
            if let Some(mut chunk) = self.chunks.get_mut(&key) {
                chunk.pending = chunk.pending.saturating_sub(1);
                chunk.used = chunk.used.saturating_sub(1);
            }
        }
    }
}

impl<R: Resource> Drop for DirectChunkLocator<R> {
    fn drop(&mut self) {
        // Chunks still alive at teardown are returned to the backend; the
        // pool warns because live counters mean leaked blocks.
        for entry in self.chunks.iter() {
            let chunk = entry.value();
            if chunk.used > 0 || chunk.pending > 0 {
                warn!(
                    "direct chunk locator: chunk {} leaked with used={} pending={}",
                    entry.key(),
                    chunk.used,
                    chunk.pending
                );
            }
            self.resource.deallocate(chunk.view, chunk.size, chunk.alignment);
        }
    }
}
