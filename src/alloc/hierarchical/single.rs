/*!
 * Single-Slot Operations
 * Acquire, map, release, split, and merge for individual slots
 */

use super::storage::{AllocState, ResolvedConfig, Slot, SlotState, NO_INDEX};
use crate::backend::{BufferView, HeapOps, HeapRegion};
use crate::core::{AllocError, AllocResult};
use log::error;

/// Guarantee a Free slot at `target_layer`, splitting ancestors downward and
/// expanding the root reservation by `expand_bytes` when every level is dry.
pub(super) fn ensure_free_slot<H: HeapOps>(
    state: &mut AllocState,
    config: &ResolvedConfig,
    heap_ops: &H,
    target_layer: usize,
) -> AllocResult<()> {
    if target_layer >= state.levels.len() {
        return Err(AllocError::OutOfRange(format!(
            "hierarchical allocator: level index {target_layer} out of range"
        )));
    }
    if !state.levels[target_layer].free_list.is_empty() {
        return Ok(());
    }

    // Walk up for the nearest level with a free slot.
    let mut parent = target_layer as isize - 1;
    while parent >= 0 && state.levels[parent as usize].free_list.is_empty() {
        parent -= 1;
    }

    // Nothing anywhere: grow the root reservation.
    let parent = if parent < 0 {
        state.reserve_region(heap_ops, config.expand_bytes)?;
        0
    } else {
        parent as usize
    };

    // Split stepwise down to the target.
    for layer in parent..target_layer {
        if !state.levels[layer + 1].free_list.is_empty() {
            continue;
        }
        if state.levels[layer].free_list.is_empty() {
            return Err(AllocError::OutOfMemory(
                "hierarchical allocator: failed to refill parent level".into(),
            ));
        }
        split_one(state, layer)?;
    }

    if state.levels[target_layer].free_list.is_empty() {
        return Err(AllocError::OutOfMemory(
            "hierarchical allocator: failed to ensure a free slot".into(),
        ));
    }
    Ok(())
}

/// Split the most recently freed slot at `parent_layer`
pub(super) fn split_one(state: &mut AllocState, parent_layer: usize) -> AllocResult<()> {
    let parent_index = *state.levels[parent_layer]
        .free_list
        .last()
        .ok_or_else(|| {
            AllocError::OutOfMemory("hierarchical allocator: no free parent to split".into())
        })?;
    split_one_at(state, parent_layer, parent_index)
}

/// Split a specific Free slot at `parent_layer` into its children.
///
/// Child slots prefer reuse from the child level's span-free list; reused
/// spans have their entries reset to Free and pushed to the child free list
/// in order.
pub(super) fn split_one_at(
    state: &mut AllocState,
    parent_layer: usize,
    parent_index: u32,
) -> AllocResult<()> {
    let child_layer = parent_layer + 1;
    if child_layer >= state.levels.len() {
        return Err(AllocError::OutOfRange(
            "hierarchical allocator: split below deepest level".into(),
        ));
    }

    let parent_view;
    {
        let level = &mut state.levels[parent_layer];
        let position = level
            .free_list
            .iter()
            .position(|&i| i == parent_index)
            .ok_or_else(|| {
                AllocError::InvalidState(
                    "hierarchical allocator: split target is not free".into(),
                )
            })?;
        level.free_list.remove(position);
        let slot = &mut level.slots[parent_index as usize];
        debug_assert_eq!(slot.state, SlotState::Free);
        debug_assert!(!slot.mapped);
        slot.state = SlotState::Split;
        parent_view = slot.view;
    }

    let count = state.ratio(parent_layer) as usize;
    let child_size = state.levels[child_layer].slot_size;
    let child = &mut state.levels[child_layer];

    // Prefer a recovered span before appending new slots.
    let begin = match child.span_free.pop() {
        Some(begin) => {
            debug_assert!(begin as usize + count <= child.slots.len());
            begin as usize
        }
        None => {
            let begin = child.slots.len();
            child
                .slots
                .resize_with(begin + count, || Slot::fresh(BufferView::empty()));
            begin
        }
    };

    for i in 0..count {
        let view = parent_view.slice(i * child_size, child_size);
        let slot = &mut child.slots[begin + i];
        *slot = Slot::fresh(view);
        slot.parent_slot = parent_index;
        child.free_list.push((begin + i) as u32);
    }

    let parent = &mut state.levels[parent_layer].slots[parent_index as usize];
    parent.child_layer = child_layer as u32;
    parent.child_begin = begin as u32;
    Ok(())
}

/// Pop the most recently freed slot and mark it InUse
pub(super) fn acquire_slot(state: &mut AllocState, layer: usize) -> AllocResult<u32> {
    let level = &mut state.levels[layer];
    let index = level.free_list.pop().ok_or_else(|| {
        AllocError::OutOfMemory(format!(
            "hierarchical allocator: no free slot at level {layer}"
        ))
    })?;
    let slot = &mut level.slots[index as usize];
    slot.state = SlotState::InUse;
    slot.used = 0;
    slot.pending = 0;
    Ok(index)
}

/// Take a specific Free slot out of the free list and mark it InUse
pub(super) fn acquire_slot_at(state: &mut AllocState, layer: usize, index: u32) -> AllocResult<()> {
    let level = &mut state.levels[layer];
    let position = level
        .free_list
        .iter()
        .position(|&i| i == index)
        .ok_or_else(|| {
            AllocError::InvalidState(format!(
                "hierarchical allocator: slot {index} at level {layer} is not free"
            ))
        })?;
    level.free_list.remove(position);
    let slot = &mut level.slots[index as usize];
    slot.state = SlotState::InUse;
    slot.used = 0;
    slot.pending = 0;
    Ok(())
}

/// Map the slot's VA range on its first use; idempotent
pub(super) fn map_slot<H: HeapOps>(
    state: &mut AllocState,
    heap_ops: &H,
    layer: usize,
    index: u32,
) -> AllocResult<BufferView> {
    let (view, slot_size, mapped) = {
        let level = &state.levels[layer];
        let slot = &level.slots[index as usize];
        debug_assert_eq!(slot.state, SlotState::InUse);
        (slot.view, level.slot_size, slot.mapped)
    };
    if !mapped {
        let mapped_view = heap_ops.map(HeapRegion::new(view.addr, slot_size))?;
        debug_assert_eq!(mapped_view.addr, view.addr);
        state.levels[layer].slots[index as usize].mapped = true;
    }
    Ok(view)
}

/// Tear down the slot's mapping; backend failures are logged, never surfaced
pub(super) fn unmap_slot<H: HeapOps>(state: &mut AllocState, heap_ops: &H, layer: usize, index: u32) {
    let (view, slot_size, mapped) = {
        let level = &state.levels[layer];
        let slot = &level.slots[index as usize];
        (slot.view, level.slot_size, slot.mapped)
    };
    if mapped {
        if let Err(err) = heap_ops.unmap(view, slot_size) {
            error!("hierarchical allocator: unmap of level {layer} slot {index} failed: {err}");
        }
        state.levels[layer].slots[index as usize].mapped = false;
    }
}

/// Return an InUse slot to the free list
pub(super) fn release_slot(state: &mut AllocState, layer: usize, index: u32) {
    let slot = &mut state.levels[layer].slots[index as usize];
    debug_assert!(!slot.mapped);
    slot.state = SlotState::Free;
    slot.used = 0;
    slot.pending = 0;
    state.levels[layer].free_list.push(index);
}

/// Merge the released slot's siblings back into their parent when every
/// child is Free. Cascades at most one level per release.
///
/// The merged children leave the ordinary free list for the span-free list,
/// so the run can be reissued as a group by the next split.
pub(super) fn try_merge_upward(state: &mut AllocState, layer: usize, index: u32) -> bool {
    if layer == 0 {
        return false;
    }
    let parent_index = state.levels[layer].slots[index as usize].parent_slot;
    if parent_index == NO_INDEX {
        return false;
    }
    let parent_layer = layer - 1;

    let begin = {
        let parent = &state.levels[parent_layer].slots[parent_index as usize];
        if parent.state != SlotState::Split || parent.child_layer as usize != layer {
            return false;
        }
        parent.child_begin as usize
    };
    let count = state.ratio(parent_layer) as usize;

    {
        let child_level = &state.levels[layer];
        debug_assert!(begin + count <= child_level.slots.len());
        for child in &child_level.slots[begin..begin + count] {
            if child.state != SlotState::Free {
                return false;
            }
        }
    }

    let child_level = &mut state.levels[layer];
    let end = (begin + count) as u32;
    child_level
        .free_list
        .retain(|&i| i < begin as u32 || i >= end);
    child_level.span_free.push(begin as u32);

    let parent = &mut state.levels[parent_layer].slots[parent_index as usize];
    parent.state = SlotState::Free;
    parent.child_layer = NO_INDEX;
    parent.child_begin = 0;
    state.levels[parent_layer].free_list.push(parent_index);
    true
}
