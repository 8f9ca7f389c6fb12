/*!
 * Buffer Manager Tests
 * Allocator blocks behind the lease substrate
 */

use crate::mock::MockResource;
use pretty_assertions::assert_eq;
use runtime_alloc::alloc::pool::{
    CompletionFastFree, DirectLargeAlloc, ImmediateReuse, MutexThreading,
};
use runtime_alloc::alloc::DirectChunkLocator;
use runtime_alloc::core::AllocError;
use runtime_alloc::{
    BufferManager, LaunchParams, PoolConfig, PoolManagerConfig, ReuseToken, SegregatedPool,
};
use std::sync::Arc;

type Pool = SegregatedPool<
    MockResource,
    DirectChunkLocator<MockResource>,
    DirectLargeAlloc,
    ImmediateReuse,
    MutexThreading,
    CompletionFastFree,
>;

fn new_manager() -> (Arc<Pool>, BufferManager<Pool>) {
    let resource = Arc::new(MockResource::new());
    let locator = DirectChunkLocator::new(Arc::clone(&resource));
    let config = PoolConfig {
        min_block_size: 64,
        max_block_size: 256,
        chunk_size: 256,
        retain_spare_blocks: None,
    };
    let pool = Arc::new(SegregatedPool::new(config, resource, locator).unwrap());
    let manager = BufferManager::new(Arc::clone(&pool));
    manager
        .configure(PoolManagerConfig {
            capacity: 8,
            growth_chunk: 8,
        })
        .unwrap();
    (pool, manager)
}

fn params() -> LaunchParams {
    LaunchParams::with_token(ReuseToken::new(1))
}

#[test]
fn test_lease_carries_allocated_block() {
    let (_pool, manager) = new_manager();

    let lease = manager.acquire(80, 0, params()).unwrap();
    let payload = lease.payload();
    assert!(payload.block.is_valid());
    assert_eq!(payload.block.view.size, 128);
    assert_eq!(payload.size, 80);
    assert_eq!(manager.live_count(), 1);
}

#[test]
fn test_lease_drop_returns_block_to_pool() {
    let (pool, manager) = new_manager();

    let view = {
        let lease = manager.acquire(80, 0, params()).unwrap();
        lease.payload().block.view
    };
    assert_eq!(manager.live_count(), 0);

    // The returned block is the first one handed back out.
    let lease = manager.acquire(80, 0, params()).unwrap();
    assert_eq!(lease.payload().block.view, view);
    assert_eq!(pool.stats().chunks_allocated, 1);
}

#[test]
fn test_payload_by_handle_matches_lease() {
    let (_pool, manager) = new_manager();

    let lease = manager.acquire(80, 0, params()).unwrap();
    let payload = manager.payload(lease.handle()).unwrap();
    assert_eq!(payload.block.view, lease.payload().block.view);
}

#[test]
fn test_stale_buffer_handle_after_release() {
    let (_pool, manager) = new_manager();

    let mut lease = manager.acquire(80, 0, params()).unwrap();
    let stale = lease.handle();
    manager.release(&mut lease);

    let _fresh = manager.acquire(80, 0, params()).unwrap();
    assert!(matches!(
        manager.payload(stale),
        Err(AllocError::InvalidState(_))
    ));
}

#[test]
fn test_shutdown_reclaims_leaked_leases() {
    let (pool, manager) = new_manager();

    let lease = manager.acquire(80, 0, params()).unwrap();
    let handle = lease.handle();
    std::mem::forget(lease);

    manager.shutdown();
    assert_eq!(manager.live_count(), 0);
    assert!(manager.payload(handle).is_err());
    // The block went back to its pool on forced destroy.
    assert!(pool.stats().free_blocks >= 1);
}

#[test]
fn test_zero_size_lease_is_empty_block() {
    let (_pool, manager) = new_manager();
    let lease = manager.acquire(0, 0, params()).unwrap();
    assert!(!lease.payload().block.is_valid());
}
