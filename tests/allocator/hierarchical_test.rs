/*!
 * Hierarchical Slot Allocator Tests
 * Configuration validation, single-slot paths, and buddy split/merge
 */

use crate::mock::MockHeapOps;
use pretty_assertions::assert_eq;
use runtime_alloc::alloc::hierarchical::SlotState;
use runtime_alloc::core::AllocError;
use runtime_alloc::{HierarchicalSlotAllocator, HierarchicalConfig};
use std::sync::Arc;

fn config(levels: &[usize]) -> HierarchicalConfig {
    HierarchicalConfig {
        levels: levels.to_vec(),
        ..Default::default()
    }
}

fn new_allocator(
    cfg: HierarchicalConfig,
) -> (Arc<MockHeapOps>, HierarchicalSlotAllocator<MockHeapOps>) {
    let heap_ops = Arc::new(MockHeapOps::new());
    let allocator = HierarchicalSlotAllocator::new(cfg, Arc::clone(&heap_ops)).unwrap();
    (heap_ops, allocator)
}

fn expect_invalid_parameter(cfg: HierarchicalConfig) {
    let heap_ops = Arc::new(MockHeapOps::new());
    match HierarchicalSlotAllocator::new(cfg, heap_ops) {
        Err(AllocError::InvalidParameter(_)) => {}
        other => panic!("expected InvalidParameter, got {other:?}"),
    }
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_rejects_empty_levels() {
    expect_invalid_parameter(config(&[]));
}

#[test]
fn test_rejects_zero_level() {
    expect_invalid_parameter(config(&[256, 0, 64]));
}

#[test]
fn test_rejects_non_decreasing_levels() {
    expect_invalid_parameter(config(&[128, 256]));
}

#[test]
fn test_rejects_non_divisible_levels() {
    expect_invalid_parameter(config(&[256, 100]));
}

#[test]
fn test_rejects_initial_bytes_not_multiple_of_root() {
    let mut cfg = config(&[256]);
    cfg.initial_bytes = 100;
    expect_invalid_parameter(cfg);
}

#[test]
fn test_accepts_initial_bytes_multiple_of_root() {
    let mut cfg = config(&[256]);
    cfg.initial_bytes = 512;
    let (heap_ops, _allocator) = new_allocator(cfg);
    assert_eq!(heap_ops.reserve_sizes(), vec![512]);
}

#[test]
fn test_rejects_expand_bytes_not_multiple_of_root() {
    let mut cfg = config(&[256]);
    cfg.expand_bytes = 100;
    expect_invalid_parameter(cfg);
}

#[test]
fn test_rejects_threshold_below_minimum() {
    let mut cfg = config(&[256]);
    cfg.threshold = 4;
    expect_invalid_parameter(cfg);
}

#[test]
fn test_rejects_threshold_not_power_of_two() {
    let mut cfg = config(&[256]);
    cfg.threshold = 100;
    expect_invalid_parameter(cfg);
}

#[test]
fn test_rejects_sub_threshold_level_not_power_of_two() {
    let mut cfg = config(&[256, 64, 48]);
    cfg.threshold = 64;
    expect_invalid_parameter(cfg);
}

#[test]
fn test_rejects_level_above_threshold_not_divisible() {
    let mut cfg = config(&[300, 60]);
    cfg.threshold = 64;
    expect_invalid_parameter(cfg);
}

#[test]
fn test_accepts_valid_threshold() {
    let mut cfg = config(&[256, 64, 32, 16]);
    cfg.threshold = 64;
    let (heap_ops, _allocator) = new_allocator(cfg);
    assert_eq!(heap_ops.reserve_sizes(), vec![256]);
}

// ============================================================================
// Request-slot vectors
// ============================================================================

#[test]
fn test_request_slots_single_level() {
    let (_heap_ops, allocator) = new_allocator(config(&[256]));
    assert_eq!(allocator.compute_request_slots(100), vec![1]);
}

#[test]
fn test_request_slots_exact_fit() {
    let (_heap_ops, allocator) = new_allocator(config(&[256, 64]));
    assert_eq!(allocator.compute_request_slots(256), vec![1, 0]);
}

#[test]
fn test_request_slots_multi_level() {
    let (_heap_ops, allocator) = new_allocator(config(&[256, 128, 64]));
    assert_eq!(allocator.compute_request_slots(300), vec![1, 0, 1]);
}

#[test]
fn test_request_slots_large_size() {
    let (_heap_ops, allocator) = new_allocator(config(&[256, 64]));
    assert_eq!(allocator.compute_request_slots(600), vec![2, 2]);
}

#[test]
fn test_request_slots_smallest_level_only() {
    let (_heap_ops, allocator) = new_allocator(config(&[256, 64]));
    assert_eq!(allocator.compute_request_slots(32), vec![0, 1]);
}

#[test]
fn test_request_slots_zero_size() {
    let (_heap_ops, allocator) = new_allocator(config(&[256, 64]));
    assert_eq!(allocator.compute_request_slots(0), vec![0, 0]);
}

// ============================================================================
// Single-slot allocation
// ============================================================================

#[test]
fn test_allocate_returns_mapped_view() {
    let (heap_ops, allocator) = new_allocator(config(&[256]));

    let view = allocator.allocate(256).unwrap();
    assert!(view.is_valid());
    assert_eq!(view.size, 256);
    assert_eq!(heap_ops.map_count(), 1);
    allocator.validate().unwrap();
}

#[test]
fn test_allocate_zero_returns_empty_view() {
    let (heap_ops, allocator) = new_allocator(config(&[256]));
    let view = allocator.allocate(0).unwrap();
    assert!(view.is_empty());
    assert_eq!(heap_ops.map_count(), 0);
}

#[test]
fn test_deallocate_unmaps_slot() {
    let (heap_ops, allocator) = new_allocator(config(&[256]));

    let view = allocator.allocate(256).unwrap();
    allocator.deallocate(view);
    assert_eq!(heap_ops.unmaps.lock().as_slice(), &[(view.addr, 256)]);
    allocator.validate().unwrap();
}

#[test]
fn test_allocate_small_splits_larger_slot() {
    let mut cfg = config(&[256, 128]);
    cfg.initial_bytes = 256;
    let (_heap_ops, allocator) = new_allocator(cfg);

    let view = allocator.allocate(128).unwrap();
    assert_eq!(view.size, 128);

    let snapshot = allocator.snapshot();
    assert_eq!(snapshot[0].slots[0].state, SlotState::Split);
    assert_eq!(snapshot[1].slots.len(), 2);
    allocator.validate().unwrap();
}

#[test]
fn test_deallocate_split_slot_unmaps_child_size() {
    let mut cfg = config(&[256, 128]);
    cfg.initial_bytes = 256;
    let (heap_ops, allocator) = new_allocator(cfg);

    let view = allocator.allocate(128).unwrap();
    allocator.deallocate(view);
    assert_eq!(heap_ops.unmaps.lock().as_slice(), &[(view.addr, 128)]);
}

#[test]
fn test_mapped_iff_in_use() {
    let mut cfg = config(&[256, 128, 64]);
    cfg.initial_bytes = 512;
    let (_heap_ops, allocator) = new_allocator(cfg);

    let a = allocator.allocate(60).unwrap();
    let b = allocator.allocate(256).unwrap();

    for level in allocator.snapshot() {
        for slot in &level.slots {
            assert_eq!(slot.mapped, slot.state == SlotState::InUse);
        }
    }

    allocator.deallocate(a);
    allocator.deallocate(b);
    for level in allocator.snapshot() {
        for slot in &level.slots {
            assert!(!slot.mapped);
            assert_ne!(slot.state, SlotState::InUse);
        }
    }
}

// ============================================================================
// Growth
// ============================================================================

#[test]
fn test_expand_bytes_used_under_pressure() {
    let mut cfg = config(&[256]);
    cfg.initial_bytes = 256;
    cfg.expand_bytes = 512;
    let (heap_ops, allocator) = new_allocator(cfg);

    let first = allocator.allocate(256).unwrap();
    let second = allocator.allocate(256).unwrap();
    assert!(first.is_valid());
    assert!(second.is_valid());
    assert_ne!(first.addr, second.addr);

    assert_eq!(heap_ops.reserve_sizes(), vec![256, 512]);
    assert_eq!(allocator.stats().reserve_calls, 2);
}

#[test]
fn test_reserve_failure_surfaces_out_of_memory() {
    let mut cfg = config(&[256]);
    cfg.initial_bytes = 256;
    let (heap_ops, allocator) = new_allocator(cfg);

    let _held = allocator.allocate(256).unwrap();
    heap_ops.fail_next_reserve(true);
    match allocator.allocate(256) {
        Err(AllocError::OutOfMemory(_)) => {}
        other => panic!("expected OutOfMemory, got {other:?}"),
    }
}

// ============================================================================
// Buddy split/merge (Scenario A)
// ============================================================================

#[test]
fn test_buddy_split_and_merge_round_trip() {
    let mut cfg = config(&[256, 128, 64]);
    cfg.initial_bytes = 256;
    let (heap_ops, allocator) = new_allocator(cfg);

    let a = allocator.allocate(50).unwrap();
    assert_eq!(a.size, 64);
    let b = allocator.allocate(100).unwrap();
    assert_eq!(b.size, 128);

    allocator.deallocate(a);
    allocator.deallocate(b);

    let snapshot = allocator.snapshot();
    // Top slot is whole again.
    assert_eq!(snapshot[0].slots[0].state, SlotState::Free);
    assert_eq!(snapshot[0].free_list.as_slice(), &[0]);
    // Merges parked each child run exactly once.
    assert_eq!(snapshot[1].span_free.as_slice(), &[(0, 2)]);
    assert_eq!(snapshot[2].span_free.as_slice(), &[(0, 2)]);
    // Merged children left the ordinary free lists.
    assert!(snapshot[1].free_list.is_empty());
    assert!(snapshot[2].free_list.is_empty());

    assert_eq!(heap_ops.reserve_sizes(), vec![256]);
    allocator.validate().unwrap();
}

#[test]
fn test_split_reuses_recovered_span() {
    let mut cfg = config(&[256, 128]);
    cfg.initial_bytes = 256;
    let (_heap_ops, allocator) = new_allocator(cfg);

    let first = allocator.allocate(128).unwrap();
    allocator.deallocate(first);
    // Merge returned the child pair as a span; the next split must reuse it
    // instead of appending new slots.
    let second = allocator.allocate(128).unwrap();

    let snapshot = allocator.snapshot();
    assert_eq!(snapshot[1].slots.len(), 2);
    assert!(snapshot[1].span_free.is_empty());

    allocator.deallocate(second);
    allocator.validate().unwrap();
}

#[test]
fn test_split_children_point_at_parent() {
    let mut cfg = config(&[256, 128, 64]);
    cfg.initial_bytes = 512;
    let (_heap_ops, allocator) = new_allocator(cfg);

    let _a = allocator.allocate(60).unwrap();

    let snapshot = allocator.snapshot();
    for (layer, level) in snapshot.iter().enumerate() {
        for (index, slot) in level.slots.iter().enumerate() {
            if slot.state != SlotState::Split {
                continue;
            }
            assert_eq!(slot.child_layer, Some(layer as u32 + 1));
            let child_level = &snapshot[layer + 1];
            let count = (level.slot_size / child_level.slot_size) as usize;
            for child in &child_level.slots
                [slot.child_begin as usize..slot.child_begin as usize + count]
            {
                assert_eq!(child.parent_slot, Some(index as u32));
            }
        }
    }
    allocator.validate().unwrap();
}
