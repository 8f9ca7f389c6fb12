/*!
 * Dense Operations
 * Multi-level contiguous allocation plans over the slot hierarchy
 */

use super::single::{
    acquire_slot_at, map_slot, release_slot, split_one_at, try_merge_upward, unmap_slot,
};
use super::storage::{AllocState, ResolvedConfig, SlotState};
use crate::backend::{BufferView, HeapOps};
use crate::core::{AllocError, AllocResult, Size};
use log::warn;

/// Index of the deepest level with a non-zero request count
pub(super) fn deepest_nonzero(rs: &[u32]) -> Option<usize> {
    rs.iter().rposition(|&count| count > 0)
}

/// Trail-plan feasibility: can the request be carved out of the tail of the
/// hierarchy, reusing the most recently freed region?
///
/// The window takes the last `rs[0]` top-level slots; deeper contributions
/// nest in the slot just below the window, descending through Split slots'
/// trailing children. A Free boundary slot satisfies every remaining level,
/// because the greedy request vector leaves less than one slot of that size
/// outstanding.
pub(super) fn plan_trail(state: &AllocState, rs: &[u32]) -> bool {
    let Some(deepest) = deepest_nonzero(rs) else {
        return false;
    };
    let root = &state.levels[0];
    let n0 = root.slots.len();
    let need0 = rs[0] as usize;
    if n0 == 0 {
        return false;
    }

    // Trailing VA-adjacent Free run at level 0.
    let mut run = 0usize;
    while run < n0 && run <= need0 {
        let idx = n0 - 1 - run;
        let slot = &root.slots[idx];
        if slot.state != SlotState::Free {
            break;
        }
        if run > 0 && slot.view.addr + root.slot_size != root.slots[idx + 1].view.addr {
            break;
        }
        run += 1;
    }
    if run < need0 {
        return false;
    }
    if deepest == 0 {
        return true;
    }

    // Boundary slot just below the level-0 window.
    if n0 < need0 + 1 {
        return false;
    }
    let boundary = n0 - need0 - 1;
    if need0 > 0 {
        let window_start = &root.slots[n0 - need0];
        if root.slots[boundary].view.addr + root.slot_size != window_start.view.addr {
            return false;
        }
    }

    let mut cur_layer = 0usize;
    let mut cur_index = boundary;
    for layer in 1..=deepest {
        let parent = &state.levels[cur_layer].slots[cur_index];
        match parent.state {
            SlotState::Free => return true,
            SlotState::InUse => return false,
            SlotState::Split => {}
        }
        if parent.child_layer as usize != layer {
            return false;
        }
        let begin = parent.child_begin as usize;
        let count = state.ratio(cur_layer) as usize;
        let need = rs[layer] as usize;
        let level = &state.levels[layer];

        let mut trailing = 0usize;
        while trailing < count
            && level.slots[begin + count - 1 - trailing].state == SlotState::Free
        {
            trailing += 1;
        }
        if trailing < need {
            return false;
        }
        if layer == deepest {
            return true;
        }
        if count < need + 1 {
            return false;
        }
        cur_layer = layer;
        cur_index = begin + count - need - 1;
    }
    true
}

/// Execute the trail plan verified by [`plan_trail`].
///
/// Rolls the acquired slots back on a mapping failure.
pub(super) fn execute_trail<H: HeapOps>(
    state: &mut AllocState,
    heap_ops: &H,
    rs: &[u32],
) -> AllocResult<BufferView> {
    let mut acquired: Vec<(usize, u32)> = Vec::new();
    match execute_trail_inner(state, heap_ops, rs, &mut acquired) {
        Ok(view) => Ok(view),
        Err(err) => {
            rollback(state, heap_ops, &acquired);
            Err(err)
        }
    }
}

fn execute_trail_inner<H: HeapOps>(
    state: &mut AllocState,
    heap_ops: &H,
    rs: &[u32],
    acquired: &mut Vec<(usize, u32)>,
) -> AllocResult<BufferView> {
    let deepest = deepest_nonzero(rs).ok_or_else(|| {
        AllocError::InvalidArgument("hierarchical allocator: empty dense request".into())
    })?;
    let n0 = state.levels[0].slots.len();
    let need0 = rs[0] as usize;

    for idx in (n0 - need0)..n0 {
        take_slot(state, heap_ops, 0, idx as u32, acquired)?;
    }

    if deepest > 0 {
        let mut cur_layer = 0usize;
        let mut cur_index = (n0 - need0 - 1) as u32;
        for layer in 1..=deepest {
            if state.levels[cur_layer].slots[cur_index as usize].state == SlotState::Free {
                split_one_at(state, cur_layer, cur_index)?;
            }
            let parent = &state.levels[cur_layer].slots[cur_index as usize];
            let begin = parent.child_begin as usize;
            let count = state.ratio(cur_layer) as usize;
            let need = rs[layer] as usize;

            for idx in (begin + count - need)..(begin + count) {
                take_slot(state, heap_ops, layer, idx as u32, acquired)?;
            }
            if layer == deepest {
                break;
            }
            cur_layer = layer;
            cur_index = (begin + count - need - 1) as u32;
        }
    }

    Ok(assemble_view(state, acquired))
}

/// Level-0 linear scan for a VA-adjacent Free run of `need` slots.
///
/// The middle plan is restricted to the coarsest level; requests with deeper
/// contributions go straight to expansion.
pub(super) fn find_middle_start(state: &AllocState, need: usize) -> Option<usize> {
    if need == 0 {
        return None;
    }
    let root = &state.levels[0];
    let mut start = 0usize;
    let mut count = 0usize;
    for (i, slot) in root.slots.iter().enumerate() {
        if slot.state != SlotState::Free {
            count = 0;
            continue;
        }
        let adjacent =
            count > 0 && root.slots[i - 1].view.addr + root.slot_size == slot.view.addr;
        if count == 0 || !adjacent {
            start = i;
            count = 1;
        } else {
            count += 1;
        }
        if count >= need {
            return Some(start);
        }
    }
    None
}

/// Acquire and map a specific level-0 run
pub(super) fn execute_run<H: HeapOps>(
    state: &mut AllocState,
    heap_ops: &H,
    start: usize,
    need: usize,
) -> AllocResult<BufferView> {
    let mut acquired: Vec<(usize, u32)> = Vec::new();
    for idx in start..start + need {
        if let Err(err) = take_slot(state, heap_ops, 0, idx as u32, &mut acquired) {
            rollback(state, heap_ops, &acquired);
            return Err(err);
        }
    }
    Ok(assemble_view(state, &acquired))
}

/// Reserve the smallest multiple of the top-level slot size covering the
/// whole request vector
pub(super) fn expand_for_request<H: HeapOps>(
    state: &mut AllocState,
    config: &ResolvedConfig,
    heap_ops: &H,
    rs: &[u32],
) -> AllocResult<()> {
    let total: Size = rs
        .iter()
        .zip(&config.levels)
        .map(|(&count, &size)| count as Size * size)
        .sum();
    let root = config.levels[0];
    let expand = total.div_ceil(root).max(1) * root;
    state.reserve_region(heap_ops, expand)
}

/// Release every slot of a dense view, walking the concatenated layout
/// (deepest level first, ascending addresses)
pub(super) fn deallocate_dense_slots<H: HeapOps>(
    state: &mut AllocState,
    heap_ops: &H,
    view: BufferView,
    rs: &[u32],
) {
    let mut offset = 0usize;
    for layer in (0..rs.len()).rev() {
        let slot_size = state.levels[layer].slot_size;
        for _ in 0..rs[layer] {
            let expected = view.addr + offset;
            let found = state.levels[layer]
                .slots
                .iter()
                .position(|s| s.state == SlotState::InUse && s.view.addr == expected);
            match found {
                Some(index) => {
                    let index = index as u32;
                    unmap_slot(state, heap_ops, layer, index);
                    release_slot(state, layer, index);
                    try_merge_upward(state, layer, index);
                }
                None => warn!(
                    "hierarchical allocator: dense release found no slot at {expected:#x} (level {layer})"
                ),
            }
            offset += slot_size;
        }
    }
}

fn take_slot<H: HeapOps>(
    state: &mut AllocState,
    heap_ops: &H,
    layer: usize,
    index: u32,
    acquired: &mut Vec<(usize, u32)>,
) -> AllocResult<()> {
    acquire_slot_at(state, layer, index)?;
    acquired.push((layer, index));
    map_slot(state, heap_ops, layer, index)?;
    Ok(())
}

fn rollback<H: HeapOps>(state: &mut AllocState, heap_ops: &H, acquired: &[(usize, u32)]) {
    for &(layer, index) in acquired.iter().rev() {
        unmap_slot(state, heap_ops, layer, index);
        release_slot(state, layer, index);
        try_merge_upward(state, layer, index);
    }
}

/// Concatenate the acquired slots into one view anchored at the lowest
/// address
fn assemble_view(state: &AllocState, acquired: &[(usize, u32)]) -> BufferView {
    debug_assert!(!acquired.is_empty());
    let mut pieces: Vec<(BufferView, Size)> = acquired
        .iter()
        .map(|&(layer, index)| {
            let level = &state.levels[layer];
            (level.slots[index as usize].view, level.slot_size)
        })
        .collect();
    pieces.sort_by_key(|(view, _)| view.addr);

    let total: Size = pieces.iter().map(|&(_, size)| size).sum();
    let first = pieces[0].0;
    if cfg!(debug_assertions) {
        let mut expected = first.addr;
        for &(view, size) in &pieces {
            debug_assert_eq!(view.addr, expected, "dense plan produced a gap");
            expected = view.addr + size;
        }
    }
    BufferView::new(first.addr, first.offset, total)
}
