/*!
 * Hierarchical Slot Allocator
 *
 * Buddy-style multi-level pool over a reserved virtual-address region with
 * lazy mapping.
 *
 * A single reservation is partitioned into levels of strictly decreasing
 * slot sizes. Requests are served from the smallest covering level, splitting
 * parents on demand; releases merge sibling runs back into their parent and
 * park the recovered child span for later reuse. Physical pages are bound
 * only while a leaf slot is InUse.
 */

mod dense;
mod single;
mod storage;

pub use storage::{
    HierarchicalConfig, HierarchicalStats, LevelSnapshot, SlotSnapshot, SlotState,
    DEFAULT_THRESHOLD, MIN_THRESHOLD,
};

use crate::alloc::types::MemoryBlock;
use crate::backend::{BufferView, HeapOps};
use crate::core::{AllocError, AllocResult, BufferId, Size};
use dense::{
    deallocate_dense_slots, deepest_nonzero, execute_run, execute_trail, expand_for_request,
    find_middle_start, plan_trail,
};
use log::{error, warn};
use parking_lot::Mutex;
use single::{
    acquire_slot, ensure_free_slot, map_slot, release_slot, try_merge_upward, unmap_slot,
};
use std::sync::Arc;
use storage::{
    resolve_config, snapshot_state, stats_state, validate_state, AllocState, ResolvedConfig,
    SlotState as State,
};

/// Buddy-style hierarchical allocator over one reserved VA space.
///
/// A single mutex guards all level state; mapping calls happen under it.
#[derive(Debug)]
pub struct HierarchicalSlotAllocator<H: HeapOps> {
    heap_ops: Arc<H>,
    config: ResolvedConfig,
    state: Mutex<AllocState>,
}

impl<H: HeapOps> HierarchicalSlotAllocator<H> {
    /// Validate the configuration and reserve the initial region.
    ///
    /// Configuration violations surface as `InvalidParameter`.
    pub fn new(config: HierarchicalConfig, heap_ops: Arc<H>) -> AllocResult<Self> {
        let config = resolve_config(config)?;
        let mut state = AllocState::new(&config.levels);
        state.reserve_region(heap_ops.as_ref(), config.initial_bytes)?;
        Ok(Self {
            heap_ops,
            config,
            state: Mutex::new(state),
        })
    }

    /// Greedy per-level slot counts representing `size`.
    ///
    /// With `b` the smallest level size and `N = ceil(size / b)`, each level
    /// takes `N / (level_size / b)` slots and passes the remainder down, so
    /// at most one slot remains per level after the coarsest one covering
    /// the request.
    pub fn compute_request_slots(&self, size: Size) -> Vec<u32> {
        let levels = &self.config.levels;
        let base = *levels.last().expect("validated config has levels");
        let mut remaining = size.div_ceil(base);
        let mut request = vec![0u32; levels.len()];
        for (i, &level_size) in levels.iter().enumerate() {
            let units = level_size / base;
            request[i] = (remaining / units) as u32;
            remaining %= units;
        }
        request
    }

    /// Allocate `size` bytes from the hierarchy.
    ///
    /// Single-slot requests take one slot from the covering level; anything
    /// else goes through the dense multi-level path.
    pub fn allocate(&self, size: Size) -> AllocResult<BufferView> {
        if size == 0 {
            return Ok(BufferView::empty());
        }
        let request = self.compute_request_slots(size);
        match Self::single_slot_level(&request) {
            Some(layer) => {
                let mut state = self.state.lock();
                self.acquire_single(&mut state, layer)
            }
            None => self.allocate_dense(size),
        }
    }

    /// Release a view returned by [`Self::allocate`]
    pub fn deallocate(&self, view: BufferView) {
        if !view.is_valid() {
            return;
        }
        let mut state = self.state.lock();
        let found = state.levels.iter().enumerate().find_map(|(layer, level)| {
            (level.slot_size == view.size)
                .then(|| {
                    level
                        .slots
                        .iter()
                        .position(|s| s.state == State::InUse && s.view.addr == view.addr)
                        .map(|index| (layer, index as u32))
                })
                .flatten()
        });
        match found {
            Some((layer, index)) => {
                unmap_slot(&mut state, self.heap_ops.as_ref(), layer, index);
                release_slot(&mut state, layer, index);
                try_merge_upward(&mut state, layer, index);
            }
            None => warn!(
                "hierarchical allocator: deallocate of unknown view {:#x} ({} bytes)",
                view.addr, view.size
            ),
        }
    }

    /// Allocate a contiguous multi-level run covering `size`.
    ///
    /// Plan order: trail (reuse the most recently freed tail), then the
    /// level-0 middle scan, then one expansion followed by a trail retry.
    /// The returned view concatenates every acquired slot, so its size is
    /// the sum of the contributing slot sizes.
    pub fn allocate_dense(&self, size: Size) -> AllocResult<BufferView> {
        if size == 0 {
            return Ok(BufferView::empty());
        }
        let request = self.compute_request_slots(size);
        let mut state = self.state.lock();

        if let Some(layer) = Self::single_slot_level(&request) {
            return self.acquire_single(&mut state, layer);
        }

        if plan_trail(&state, &request) {
            return execute_trail(&mut state, self.heap_ops.as_ref(), &request);
        }
        if deepest_nonzero(&request) == Some(0) {
            if let Some(start) = find_middle_start(&state, request[0] as usize) {
                return execute_run(
                    &mut state,
                    self.heap_ops.as_ref(),
                    start,
                    request[0] as usize,
                );
            }
        }

        expand_for_request(&mut state, &self.config, self.heap_ops.as_ref(), &request)?;
        if plan_trail(&state, &request) {
            return execute_trail(&mut state, self.heap_ops.as_ref(), &request);
        }
        error!("hierarchical allocator: no dense plan for {size} bytes after expansion");
        Err(AllocError::OutOfMemory(format!(
            "hierarchical allocator: cannot allocate dense region of {size} bytes"
        )))
    }

    /// Release a view returned by [`Self::allocate_dense`]
    pub fn deallocate_dense(&self, view: BufferView, size: Size) {
        if !view.is_valid() {
            return;
        }
        let request = self.compute_request_slots(size);
        let mut state = self.state.lock();
        deallocate_dense_slots(&mut state, self.heap_ops.as_ref(), view, &request);
    }

    /// Diagnostic copy of every level's slots, free list, and span-free list
    pub fn snapshot(&self) -> Vec<LevelSnapshot> {
        snapshot_state(&self.state.lock())
    }

    /// Walk the internal invariants, returning the first violation
    pub fn validate(&self) -> AllocResult<()> {
        validate_state(&self.state.lock())
    }

    pub fn stats(&self) -> HierarchicalStats {
        stats_state(&self.state.lock())
    }

    fn single_slot_level(request: &[u32]) -> Option<usize> {
        let mut single = None;
        for (layer, &count) in request.iter().enumerate() {
            match (count, single) {
                (0, _) => {}
                (1, None) => single = Some(layer),
                _ => return None,
            }
        }
        single
    }

    fn acquire_single(&self, state: &mut AllocState, layer: usize) -> AllocResult<BufferView> {
        ensure_free_slot(state, &self.config, self.heap_ops.as_ref(), layer)?;
        let index = acquire_slot(state, layer)?;
        match map_slot(state, self.heap_ops.as_ref(), layer, index) {
            Ok(view) => Ok(view),
            Err(err) => {
                release_slot(state, layer, index);
                try_merge_upward(state, layer, index);
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Chunk-locator surface: one chunk = one slot, counters on the slot.
    // ------------------------------------------------------------------

    pub(crate) fn chunk_acquire(&self, size: Size) -> AllocResult<MemoryBlock> {
        let layer = self.pick_layer(size).ok_or_else(|| {
            AllocError::OutOfMemory(format!(
                "hierarchical chunk locator: no level covers {size} bytes"
            ))
        })?;
        let mut state = self.state.lock();
        ensure_free_slot(&mut state, &self.config, self.heap_ops.as_ref(), layer)?;
        let index = acquire_slot(&mut state, layer)?;
        if index > BufferId::MAX_SLOT {
            release_slot(&mut state, layer, index);
            return Err(AllocError::OutOfRange(format!(
                "hierarchical chunk locator: slot index {index} exceeds id space"
            )));
        }
        let view = match map_slot(&mut state, self.heap_ops.as_ref(), layer, index) {
            Ok(view) => view,
            Err(err) => {
                release_slot(&mut state, layer, index);
                try_merge_upward(&mut state, layer, index);
                return Err(err);
            }
        };
        Ok(MemoryBlock::new(
            BufferId::encode_slot(layer as u32, index),
            view,
        ))
    }

    /// Release a chunk iff its counters are drained. Second and invalid
    /// releases return `false` without side effects.
    pub(crate) fn chunk_release(&self, id: BufferId) -> bool {
        let Some((layer, index)) = self.checked_decode(id) else {
            return false;
        };
        let mut state = self.state.lock();
        {
            let Some(slot) = state.levels[layer].slots.get(index as usize) else {
                return false;
            };
            if slot.state != State::InUse || slot.used > 0 || slot.pending > 0 {
                return false;
            }
        }
        unmap_slot(&mut state, self.heap_ops.as_ref(), layer, index);
        release_slot(&mut state, layer, index);
        try_merge_upward(&mut state, layer, index);
        true
    }

    pub(crate) fn chunk_size_of(&self, id: BufferId) -> Size {
        let Some((layer, index)) = self.checked_decode(id) else {
            return 0;
        };
        let state = self.state.lock();
        if index as usize >= state.levels[layer].slots.len() {
            return 0;
        }
        state.levels[layer].slot_size
    }

    pub(crate) fn chunk_is_alive(&self, id: BufferId) -> bool {
        let Some((layer, index)) = self.checked_decode(id) else {
            return false;
        };
        let state = self.state.lock();
        state.levels[layer]
            .slots
            .get(index as usize)
            .is_some_and(|slot| slot.state == State::InUse)
    }

    /// Adjust a live chunk's counters; invalid ids are silent no-ops
    pub(crate) fn chunk_adjust(&self, id: BufferId, adjust: impl FnOnce(&mut u32, &mut u32)) {
        let Some((layer, index)) = self.checked_decode(id) else {
            return;
        };
        let mut state = self.state.lock();
        if let Some(slot) = state.levels[layer].slots.get_mut(index as usize) {
            if slot.state == State::InUse {
                let (mut used, mut pending) = (slot.used, slot.pending);
                adjust(&mut used, &mut pending);
                slot.used = used;
                slot.pending = pending;
            }
        }
    }

    fn pick_layer(&self, size: Size) -> Option<usize> {
        let mut best = None;
        for (layer, &level_size) in self.config.levels.iter().enumerate() {
            if size <= level_size {
                best = Some(layer);
            } else {
                break;
            }
        }
        best
    }

    fn checked_decode(&self, id: BufferId) -> Option<(usize, u32)> {
        if !id.is_valid() || id.is_large() {
            return None;
        }
        let (layer, slot) = id.decode_slot();
        ((layer as usize) < self.config.levels.len()).then_some((layer as usize, slot))
    }
}

impl<H: HeapOps> Drop for HierarchicalSlotAllocator<H> {
    fn drop(&mut self) {
        // Teardown never faults: unmap-without-map releases each reserved
        // region; backend errors are logged and suppressed.
        let state = self.state.lock();
        for region in &state.regions {
            let view = BufferView::new(region.addr, 0, region.size);
            if let Err(err) = self.heap_ops.unmap(view, region.size) {
                error!(
                    "hierarchical allocator: region teardown failed at {:#x}: {err}",
                    region.addr
                );
            }
        }
    }
}
