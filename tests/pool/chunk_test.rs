/*!
 * Chunk Locator Tests
 * Direct and hierarchical providers behind the same accounting API
 */

use crate::mock::{MockHeapOps, MockResource};
use pretty_assertions::assert_eq;
use runtime_alloc::alloc::hierarchical::SlotState;
use runtime_alloc::alloc::pool::{
    CompletionFastFree, DeferredReuse, DirectLargeAlloc, NoLockThreading,
};
use runtime_alloc::alloc::{ChunkLocator, DirectChunkLocator, HierarchicalChunkLocator};
use runtime_alloc::{
    HierarchicalConfig, HierarchicalSlotAllocator, LaunchParams, PoolConfig, ReuseToken,
    SegregatedPool,
};
use std::sync::Arc;

fn hierarchical_locator(
    levels: &[usize],
    initial_bytes: usize,
) -> (Arc<MockHeapOps>, HierarchicalChunkLocator<MockHeapOps>) {
    let heap_ops = Arc::new(MockHeapOps::new());
    let cfg = HierarchicalConfig {
        levels: levels.to_vec(),
        initial_bytes,
        ..Default::default()
    };
    let allocator =
        Arc::new(HierarchicalSlotAllocator::new(cfg, Arc::clone(&heap_ops)).unwrap());
    (heap_ops, HierarchicalChunkLocator::new(allocator))
}

#[test]
fn test_direct_release_round_trip() {
    let resource = Arc::new(MockResource::new());
    let locator = DirectChunkLocator::new(Arc::clone(&resource));

    let chunk = locator.add_chunk(512, 0).unwrap();
    assert_eq!(locator.find_chunk_size(chunk.id), 512);
    assert!(locator.release_chunk(chunk.id));
    assert!(!locator.release_chunk(chunk.id));
    assert_eq!(resource.dealloc_count(), 1);
}

#[test]
fn test_hierarchical_chunk_comes_from_smallest_fitting_level() {
    let (_heap_ops, locator) = hierarchical_locator(&[1024, 256, 64], 1024);

    let chunk = locator.add_chunk(200, 0).unwrap();
    assert_eq!(locator.find_chunk_size(chunk.id), 256);
    assert!(chunk.view.size == 256);

    let (layer, _slot) = chunk.id.decode_slot();
    assert_eq!(layer, 1);
}

#[test]
fn test_hierarchical_release_respects_counters() {
    let (_heap_ops, locator) = hierarchical_locator(&[1024, 256, 64], 1024);

    let chunk = locator.add_chunk(256, 0).unwrap();
    locator.increment_used(chunk.id);
    assert!(!locator.release_chunk(chunk.id));

    locator.increment_pending(chunk.id);
    locator.decrement_used(chunk.id);
    assert!(!locator.release_chunk(chunk.id));

    locator.decrement_pending(chunk.id);
    assert!(locator.release_chunk(chunk.id));
    assert!(!locator.release_chunk(chunk.id));
    assert!(!locator.is_alive(chunk.id));
}

#[test]
fn test_hierarchical_release_merges_slots() {
    let (heap_ops, locator) = hierarchical_locator(&[1024, 256], 1024);

    let a = locator.add_chunk(256, 0).unwrap();
    let b = locator.add_chunk(256, 0).unwrap();
    assert!(locator.release_chunk(a.id));
    assert!(locator.release_chunk(b.id));

    // With every child free again the parent merged back.
    let allocator = locator.allocator();
    let snapshot = allocator.snapshot();
    assert_eq!(snapshot[0].slots[0].state, SlotState::Free);
    assert_eq!(snapshot[1].span_free.len(), 1);
    allocator.validate().unwrap();
    assert_eq!(heap_ops.unmap_count(), 2);
}

#[test]
fn test_invalid_ids_are_silent_no_ops() {
    let (_heap_ops, locator) = hierarchical_locator(&[1024, 256], 1024);

    let invalid = runtime_alloc::BufferId::invalid();
    assert!(!locator.release_chunk(invalid));
    assert!(!locator.is_alive(invalid));
    assert_eq!(locator.find_chunk_size(invalid), 0);
    locator.increment_used(invalid);
    locator.decrement_pending_and_used(invalid);
}

#[test]
fn test_pool_over_hierarchical_locator() {
    let (_heap_ops, locator) = hierarchical_locator(&[1024, 256], 1024);
    let resource = Arc::new(MockResource::new());

    type HierarchicalPool = SegregatedPool<
        MockResource,
        HierarchicalChunkLocator<MockHeapOps>,
        DirectLargeAlloc,
        DeferredReuse,
        NoLockThreading,
        CompletionFastFree,
    >;
    let config = PoolConfig {
        min_block_size: 64,
        max_block_size: 256,
        chunk_size: 256,
        retain_spare_blocks: None,
    };
    let pool: HierarchicalPool = SegregatedPool::new(config, resource, locator).unwrap();

    let params = LaunchParams::with_token(ReuseToken::new(1));
    let block = pool.allocate(80, 0, &params).unwrap();
    assert!(block.is_valid());
    assert_eq!(block.view.size, 128);

    pool.deallocate(&block, 80, 0, &params);
    assert_eq!(pool.stats().pending_blocks, 0);

    let again = pool.allocate(80, 0, &params).unwrap();
    assert_eq!(again.view, block.view);
}

#[test]
fn test_buffer_id_round_trip_under_locator() {
    for layer in [0u32, 1, 255] {
        for slot in [0u32, 9, (1 << 23) - 1] {
            let id = runtime_alloc::BufferId::encode_slot(layer, slot);
            assert_eq!(id.decode_slot(), (layer, slot));
            assert!(!id.is_large());
        }
    }
}
