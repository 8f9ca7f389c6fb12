/*!
 * Segregated Pool
 *
 * Top-level allocator composing size-class freelists, chunk provisioning,
 * large-allocation pass-through, and deferred reuse under asynchronous
 * completion.
 */

mod fast_free;
mod freelist;
mod large;
mod reuse;
mod threading;

pub use fast_free::{CompletionFastFree, DisabledFastFree, FastFreePolicy};
pub use large::{DirectLargeAlloc, LargeAllocPolicy};
pub use reuse::{DeferredReuse, ImmediateReuse, ReusePolicy};
pub use threading::{MutexThreading, NoLockThreading, ThreadingPolicy};

use crate::alloc::chunk::ChunkLocator;
use crate::alloc::types::MemoryBlock;
use crate::backend::{LaunchParams, Resource};
use crate::core::{AllocError, AllocResult, BufferId, Size};
use freelist::Freelist;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Segregated pool configuration.
///
/// Block sizes must be powers of two and the chunk size a multiple of the
/// largest class; violations are rejected with `InvalidArgument`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub min_block_size: Size,
    pub max_block_size: Size,
    pub chunk_size: Size,
    /// Free blocks a class must retain for an idle chunk to be released;
    /// `None` keeps one chunk's worth.
    pub retain_spare_blocks: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_block_size: 256,
            max_block_size: 1 << 20,
            chunk_size: 4 << 20,
            retain_spare_blocks: None,
        }
    }
}

/// Aggregate pool counters for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub free_blocks: usize,
    pub pending_blocks: usize,
    pub chunks_allocated: usize,
    pub chunks_released: usize,
    pub large_active: usize,
}

#[derive(Debug)]
struct PoolState<U> {
    freelist: Freelist,
    reuse: U,
    chunks_allocated: usize,
    chunks_released: usize,
    large_active: usize,
}

/// Size-class pool over a chunk locator.
///
/// Policy slots are type parameters: the chunk provider, the large-alloc
/// pass-through, the reuse discipline, the locking discipline, and the
/// fast-free shortcut. Compile-time composition keeps each combination a
/// distinct, analyzable type.
pub struct SegregatedPool<R, C, L, U, T, F>
where
    R: Resource,
    C: ChunkLocator,
    L: LargeAllocPolicy<R>,
    U: ReusePolicy<R>,
    T: ThreadingPolicy,
    F: FastFreePolicy<R>,
{
    resource: Arc<R>,
    locator: C,
    large: L,
    fast_free: F,
    config: PoolConfig,
    state: T::Cell<PoolState<U>>,
}

impl<R, C, L, U, T, F> SegregatedPool<R, C, L, U, T, F>
where
    R: Resource,
    C: ChunkLocator,
    L: LargeAllocPolicy<R>,
    U: ReusePolicy<R>,
    T: ThreadingPolicy,
    F: FastFreePolicy<R>,
{
    pub fn new(config: PoolConfig, resource: Arc<R>, locator: C) -> AllocResult<Self> {
        if config.min_block_size == 0 || !config.min_block_size.is_power_of_two() {
            return Err(AllocError::InvalidArgument(format!(
                "segregated pool: min_block_size {} is not a power of two",
                config.min_block_size
            )));
        }
        if !config.max_block_size.is_power_of_two() {
            return Err(AllocError::InvalidArgument(format!(
                "segregated pool: max_block_size {} is not a power of two",
                config.max_block_size
            )));
        }
        if config.min_block_size > config.max_block_size {
            return Err(AllocError::InvalidArgument(format!(
                "segregated pool: min_block_size {} exceeds max_block_size {}",
                config.min_block_size, config.max_block_size
            )));
        }
        if config.chunk_size == 0 || config.chunk_size % config.max_block_size != 0 {
            return Err(AllocError::InvalidArgument(format!(
                "segregated pool: chunk_size {} is not a multiple of max_block_size {}",
                config.chunk_size, config.max_block_size
            )));
        }

        let freelist = Freelist::new(config.min_block_size, config.max_block_size);
        info!(
            "segregated pool: {} size classes over [{}, {}], chunk size {}",
            freelist.class_count(),
            config.min_block_size,
            config.max_block_size,
            config.chunk_size
        );
        Ok(Self {
            resource,
            locator,
            large: L::default(),
            fast_free: F::default(),
            state: T::new_cell(PoolState {
                freelist,
                reuse: U::default(),
                chunks_allocated: 0,
                chunks_released: 0,
                large_active: 0,
            }),
            config,
        })
    }

    pub fn resource(&self) -> &Arc<R> {
        &self.resource
    }

    pub fn locator(&self) -> &C {
        &self.locator
    }

    /// Allocate `size` bytes rounded up to its size class.
    ///
    /// Zero-sized requests yield the empty block; requests above the largest
    /// class pass through the large-alloc policy and carry its id flag.
    pub fn allocate(
        &self,
        size: Size,
        alignment: Size,
        params: &LaunchParams,
    ) -> AllocResult<MemoryBlock> {
        if size == 0 {
            return Ok(MemoryBlock::empty());
        }
        if size > self.config.max_block_size {
            let block = self
                .large
                .allocate(self.resource.as_ref(), size, alignment, params)?;
            T::with(&self.state, |state| state.large_active += 1);
            return Ok(block);
        }
        T::with(&self.state, |state| self.allocate_pooled(state, size))
    }

    /// Return a block.
    ///
    /// Large blocks go straight back to the backend. Pool blocks rejoin the
    /// freelist synchronously when the submitting stream already completed;
    /// otherwise they enter the reuse set with the chunk's `pending` raised
    /// and `used` untouched until the token completes.
    pub fn deallocate(
        &self,
        block: &MemoryBlock,
        size: Size,
        alignment: Size,
        params: &LaunchParams,
    ) {
        if !block.is_valid() {
            return;
        }
        if block.is_large() {
            self.large
                .deallocate(self.resource.as_ref(), block, size, alignment, params);
            T::with(&self.state, |state| {
                state.large_active = state.large_active.saturating_sub(1);
            });
            return;
        }
        T::with(&self.state, |state| {
            let class = state.freelist.class_index(size);
            if !U::DEFERS || self.fast_free.can_free_now(self.resource.as_ref(), params) {
                state.freelist.push(class, *block);
                self.locator.decrement_used(block.id);
            } else {
                self.locator.increment_pending(block.id);
                state.reuse.defer(*block, class, params.token);
            }
        });
    }

    /// Force a reuse drain without allocating
    pub fn flush(&self) {
        T::with(&self.state, |state| self.drain_reuse(state));
    }

    pub fn stats(&self) -> PoolStats {
        T::with(&self.state, |state| PoolStats {
            free_blocks: state.freelist.total_len(),
            pending_blocks: state.reuse.pending_len(),
            chunks_allocated: state.chunks_allocated,
            chunks_released: state.chunks_released,
            large_active: state.large_active,
        })
    }

    fn allocate_pooled(&self, state: &mut PoolState<U>, size: Size) -> AllocResult<MemoryBlock> {
        self.drain_reuse(state);

        let class = state.freelist.class_index(size);
        if let Some(block) = state.freelist.pop(class) {
            self.locator.increment_used(block.id);
            return Ok(block);
        }

        // Class is dry: provision a chunk and carve it into blocks.
        let block_size = state.freelist.block_size(class);
        let chunk = self.locator.add_chunk(self.config.chunk_size, 0)?;
        state.chunks_allocated += 1;

        let count = self.config.chunk_size / block_size;
        for i in (1..count).rev() {
            let view = self
                .resource
                .make_view(chunk.view, i * block_size, block_size);
            state.freelist.push(class, MemoryBlock::new(chunk.id, view));
        }
        let first = MemoryBlock::new(
            chunk.id,
            self.resource.make_view(chunk.view, 0, block_size),
        );
        self.locator.increment_used(chunk.id);
        Ok(first)
    }

    fn drain_reuse(&self, state: &mut PoolState<U>) {
        if !U::DEFERS {
            return;
        }
        let completed = state.reuse.drain(self.resource.as_ref());
        if completed.is_empty() {
            return;
        }
        let mut candidates: Vec<(BufferId, usize)> = Vec::new();
        for (block, class) in completed {
            self.locator.decrement_pending_and_used(block.id);
            state.freelist.push(class, block);
            if !candidates.iter().any(|&(id, _)| id == block.id) {
                candidates.push((block.id, class));
            }
        }
        for (id, class) in candidates {
            self.try_release_chunk(state, id, class);
        }
    }

    /// Release an idle chunk only when the class freelist keeps enough spare
    /// blocks after the chunk's own blocks are purged.
    fn try_release_chunk(&self, state: &mut PoolState<U>, id: BufferId, class: usize) {
        let blocks_per_chunk = self.config.chunk_size / state.freelist.block_size(class);
        let retain = self.config.retain_spare_blocks.unwrap_or(blocks_per_chunk);

        let taken = state.freelist.take_chunk_blocks(class, id);
        if state.freelist.len(class) >= retain && self.locator.release_chunk(id) {
            state.chunks_released += 1;
        } else {
            // Chunk still referenced or the class would run dry; keep it.
            state.freelist.reinsert(class, taken);
        }
    }
}
