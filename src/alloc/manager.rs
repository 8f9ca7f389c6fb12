/*!
 * Buffer Manager
 * Lease-substrate binding for pool-allocated buffers
 */

use crate::alloc::types::MemoryBlock;
use crate::backend::LaunchParams;
use crate::core::{AllocResult, Size};
use crate::lease::{Lease, PoolManager, PoolManagerConfig, PoolTraits, UniqueControl};
use std::sync::Arc;

/// Anything that can hand out and take back pool blocks.
///
/// Implemented by every `Sync` segregated pool composition, so the buffer
/// manager does not care which policies the pool was built from.
pub trait BlockSource: Send + Sync {
    fn allocate_block(
        &self,
        size: Size,
        alignment: Size,
        params: &LaunchParams,
    ) -> AllocResult<MemoryBlock>;

    fn deallocate_block(
        &self,
        block: &MemoryBlock,
        size: Size,
        alignment: Size,
        params: &LaunchParams,
    );
}

impl<R, C, L, U, T, F> BlockSource for crate::alloc::pool::SegregatedPool<R, C, L, U, T, F>
where
    R: crate::backend::Resource,
    C: crate::alloc::chunk::ChunkLocator,
    L: crate::alloc::pool::LargeAllocPolicy<R>,
    U: crate::alloc::pool::ReusePolicy<R>,
    T: crate::alloc::pool::ThreadingPolicy,
    F: crate::alloc::pool::FastFreePolicy<R>,
    Self: Send + Sync,
{
    fn allocate_block(
        &self,
        size: Size,
        alignment: Size,
        params: &LaunchParams,
    ) -> AllocResult<MemoryBlock> {
        self.allocate(size, alignment, params)
    }

    fn deallocate_block(
        &self,
        block: &MemoryBlock,
        size: Size,
        alignment: Size,
        params: &LaunchParams,
    ) {
        self.deallocate(block, size, alignment, params);
    }
}

/// Buffer acquisition request
#[derive(Debug, Clone, Copy)]
pub struct BufferRequest {
    pub size: Size,
    pub alignment: Size,
    pub params: LaunchParams,
}

/// Payload bound to each buffer lease: the block plus everything needed to
/// return it
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferPayload {
    pub block: MemoryBlock,
    pub size: Size,
    pub alignment: Size,
    pub params: LaunchParams,
}

/// Pool traits wiring buffer leases to a block source
pub struct BufferTraits<S: BlockSource> {
    source: Arc<S>,
}

impl<S: BlockSource> PoolTraits for BufferTraits<S> {
    type Payload = BufferPayload;
    type Control = UniqueControl;
    type Request = BufferRequest;

    const NAME: &'static str = "buffer manager";

    fn create(&self, payload: &mut BufferPayload, request: &BufferRequest) -> AllocResult<()> {
        let block = self
            .source
            .allocate_block(request.size, request.alignment, &request.params)?;
        *payload = BufferPayload {
            block,
            size: request.size,
            alignment: request.alignment,
            params: request.params,
        };
        Ok(())
    }

    fn destroy(&self, payload: &mut BufferPayload) {
        self.source
            .deallocate_block(&payload.block, payload.size, payload.alignment, &payload.params);
        *payload = BufferPayload::default();
    }
}

/// Lease over one allocated buffer; returns the block to its pool on drop
pub type BufferLease<S> = Lease<BufferTraits<S>>;

/// Manager handing out buffer leases backed by a segregated pool.
///
/// The last release of a lease (drop or explicit) runs the destroy hook,
/// which returns the block to the pool; a leaked lease is reclaimed by
/// `shutdown` and its stale handle is rejected afterwards.
#[derive(Clone)]
pub struct BufferManager<S: BlockSource> {
    manager: PoolManager<BufferTraits<S>>,
}

impl<S: BlockSource> BufferManager<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            manager: PoolManager::new(BufferTraits { source }),
        }
    }

    pub fn configure(&self, config: PoolManagerConfig) -> AllocResult<()> {
        self.manager.configure(config)
    }

    /// Idempotent; safe before or after `configure`
    pub fn shutdown(&self) {
        self.manager.shutdown();
    }

    pub fn acquire(
        &self,
        size: Size,
        alignment: Size,
        params: LaunchParams,
    ) -> AllocResult<BufferLease<S>> {
        self.manager.acquire(BufferRequest {
            size,
            alignment,
            params,
        })
    }

    /// Idempotent release; safe on already-released leases
    pub fn release(&self, lease: &mut BufferLease<S>) {
        self.manager.release(lease);
    }

    /// Clone the payload behind a handle, verifying its generation
    pub fn payload(
        &self,
        handle: crate::lease::Handle<BufferTraits<S>>,
    ) -> AllocResult<BufferPayload> {
        self.manager.payload(handle)
    }

    pub fn live_count(&self) -> usize {
        self.manager.live_count()
    }

    pub fn is_configured(&self) -> bool {
        self.manager.is_configured()
    }
}
