/*!
 * Hierarchical Allocator Storage
 * Level/slot bookkeeping, configuration validation, and region reservation
 */

use crate::backend::{BufferView, HeapOps, HeapRegion};
use crate::core::{AllocError, AllocResult, Size};
use serde::{Deserialize, Serialize};

/// Levels below this size-class boundary must be powers of two when no
/// explicit threshold is configured.
pub const DEFAULT_THRESHOLD: Size = 64;

/// System floor for the configurable threshold
pub const MIN_THRESHOLD: Size = 8;

pub(super) const NO_INDEX: u32 = u32::MAX;

/// Hierarchical allocator configuration.
///
/// `levels` is the strictly decreasing sequence of slot sizes, largest
/// first; each entry must divide its predecessor. Zero `threshold`,
/// `initial_bytes`, or `expand_bytes` select the defaults (the size-class
/// floor, one top-level slot, and one top-level slot respectively).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchicalConfig {
    pub levels: Vec<Size>,
    pub threshold: Size,
    pub initial_bytes: Size,
    pub expand_bytes: Size,
}

/// Validated configuration with defaults applied
#[derive(Debug, Clone)]
pub(super) struct ResolvedConfig {
    pub levels: Vec<Size>,
    pub threshold: Size,
    pub initial_bytes: Size,
    pub expand_bytes: Size,
}

pub(super) fn resolve_config(config: HierarchicalConfig) -> AllocResult<ResolvedConfig> {
    let HierarchicalConfig {
        levels,
        threshold,
        initial_bytes,
        expand_bytes,
    } = config;

    if levels.is_empty() {
        return Err(AllocError::InvalidParameter(
            "hierarchical allocator: empty level list".into(),
        ));
    }
    for (i, &size) in levels.iter().enumerate() {
        if size == 0 {
            return Err(AllocError::InvalidParameter(format!(
                "hierarchical allocator: level {i} has zero size"
            )));
        }
    }
    for pair in levels.windows(2) {
        let (parent, child) = (pair[0], pair[1]);
        if child >= parent {
            return Err(AllocError::InvalidParameter(format!(
                "hierarchical allocator: levels must strictly decrease ({parent} -> {child})"
            )));
        }
        if parent % child != 0 {
            return Err(AllocError::InvalidParameter(format!(
                "hierarchical allocator: level size {child} does not divide {parent}"
            )));
        }
    }

    let threshold = if threshold == 0 {
        DEFAULT_THRESHOLD
    } else {
        threshold
    };
    if threshold < MIN_THRESHOLD {
        return Err(AllocError::InvalidParameter(format!(
            "hierarchical allocator: threshold {threshold} below minimum {MIN_THRESHOLD}"
        )));
    }
    if !threshold.is_power_of_two() {
        return Err(AllocError::InvalidParameter(format!(
            "hierarchical allocator: threshold {threshold} is not a power of two"
        )));
    }
    for &size in &levels {
        if size < threshold && !size.is_power_of_two() {
            return Err(AllocError::InvalidParameter(format!(
                "hierarchical allocator: sub-threshold level {size} is not a power of two"
            )));
        }
        if size >= threshold && size % threshold != 0 {
            return Err(AllocError::InvalidParameter(format!(
                "hierarchical allocator: level {size} is not a multiple of threshold {threshold}"
            )));
        }
    }

    let root = levels[0];
    let initial_bytes = if initial_bytes == 0 { root } else { initial_bytes };
    if initial_bytes % root != 0 {
        return Err(AllocError::InvalidParameter(format!(
            "hierarchical allocator: initial_bytes {initial_bytes} is not a multiple of {root}"
        )));
    }
    let expand_bytes = if expand_bytes == 0 { root } else { expand_bytes };
    if expand_bytes % root != 0 {
        return Err(AllocError::InvalidParameter(format!(
            "hierarchical allocator: expand_bytes {expand_bytes} is not a multiple of {root}"
        )));
    }

    Ok(ResolvedConfig {
        levels,
        threshold,
        initial_bytes,
        expand_bytes,
    })
}

/// Slot lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    Free,
    InUse,
    Split,
}

#[derive(Debug, Clone)]
pub(super) struct Slot {
    pub view: BufferView,
    pub state: SlotState,
    pub mapped: bool,
    pub parent_slot: u32,
    pub child_layer: u32,
    pub child_begin: u32,
    pub used: u32,
    pub pending: u32,
}

impl Slot {
    pub fn fresh(view: BufferView) -> Self {
        Self {
            view,
            state: SlotState::Free,
            mapped: false,
            parent_slot: NO_INDEX,
            child_layer: NO_INDEX,
            child_begin: 0,
            used: 0,
            pending: 0,
        }
    }
}

/// One size class: append-only slots (indices are stable handles), a free
/// list, and a span-free list of merge-recovered contiguous runs.
///
/// Span entries store only the run's begin; the run length is always the
/// parent/child size ratio, reconstructed on reuse.
#[derive(Debug)]
pub(super) struct Level {
    pub slot_size: Size,
    pub slots: Vec<Slot>,
    pub free_list: Vec<u32>,
    pub span_free: Vec<u32>,
}

impl Level {
    fn new(slot_size: Size) -> Self {
        Self {
            slot_size,
            slots: Vec::new(),
            free_list: Vec::new(),
            span_free: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub(super) struct AllocState {
    pub levels: Vec<Level>,
    pub regions: Vec<HeapRegion>,
    pub reserve_calls: usize,
}

impl AllocState {
    pub fn new(level_sizes: &[Size]) -> Self {
        Self {
            levels: level_sizes.iter().map(|&s| Level::new(s)).collect(),
            regions: Vec::new(),
            reserve_calls: 0,
        }
    }

    /// Sibling count of a split at `parent_layer`
    #[inline]
    pub fn ratio(&self, parent_layer: usize) -> u32 {
        (self.levels[parent_layer].slot_size / self.levels[parent_layer + 1].slot_size) as u32
    }

    /// Reserve a fresh region and chop it into top-level Free slots
    pub fn reserve_region<H: HeapOps>(&mut self, heap_ops: &H, bytes: Size) -> AllocResult<()> {
        let root_size = self.levels[0].slot_size;
        let bytes = if bytes == 0 { root_size } else { bytes };
        debug_assert_eq!(bytes % root_size, 0);

        let region = heap_ops.reserve(bytes)?;
        self.reserve_calls += 1;
        self.regions.push(region);

        let root = &mut self.levels[0];
        let count = bytes / root_size;
        for i in 0..count {
            let view = BufferView::new(region.addr + i * root_size, 0, root_size);
            let index = root.slots.len() as u32;
            root.slots.push(Slot::fresh(view));
            root.free_list.push(index);
        }
        log::info!(
            "hierarchical allocator: reserved {bytes} bytes ({count} top-level slots, {} total reservations)",
            self.reserve_calls
        );
        Ok(())
    }
}

/// Point-in-time diagnostic copy of one slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub state: SlotState,
    pub mapped: bool,
    pub parent_slot: Option<u32>,
    pub child_layer: Option<u32>,
    pub child_begin: u32,
    pub used: u32,
    pub pending: u32,
}

/// Point-in-time diagnostic copy of one level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelSnapshot {
    pub slot_size: Size,
    pub slots: Vec<SlotSnapshot>,
    pub free_list: Vec<u32>,
    /// Recovered contiguous runs as `(begin, count)`
    pub span_free: Vec<(u32, u32)>,
}

/// Aggregate counters for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchicalStats {
    pub reserve_calls: usize,
    pub reserved_bytes: Size,
    pub mapped_slots: usize,
    pub free_slots: usize,
    pub split_slots: usize,
}

pub(super) fn snapshot_state(state: &AllocState) -> Vec<LevelSnapshot> {
    state
        .levels
        .iter()
        .enumerate()
        .map(|(layer, level)| {
            let span_count = if layer == 0 {
                0
            } else {
                state.ratio(layer - 1)
            };
            LevelSnapshot {
                slot_size: level.slot_size,
                slots: level
                    .slots
                    .iter()
                    .map(|s| SlotSnapshot {
                        state: s.state,
                        mapped: s.mapped,
                        parent_slot: (s.parent_slot != NO_INDEX).then_some(s.parent_slot),
                        child_layer: (s.child_layer != NO_INDEX).then_some(s.child_layer),
                        child_begin: s.child_begin,
                        used: s.used,
                        pending: s.pending,
                    })
                    .collect(),
                free_list: level.free_list.clone(),
                span_free: level
                    .span_free
                    .iter()
                    .map(|&begin| (begin, span_count))
                    .collect(),
            }
        })
        .collect()
}

/// Consistency walk over free lists, span lists, and split child ranges.
///
/// Returns `InvalidState` naming the first violation found.
pub(super) fn validate_state(state: &AllocState) -> AllocResult<()> {
    let fail = |msg: String| Err(AllocError::InvalidState(format!("hierarchical allocator: {msg}")));

    for (layer, level) in state.levels.iter().enumerate() {
        let mut seen = vec![false; level.slots.len()];
        for &index in &level.free_list {
            let Some(slot) = level.slots.get(index as usize) else {
                return fail(format!("free list index {index} out of range at level {layer}"));
            };
            if seen[index as usize] {
                return fail(format!("duplicate free list index {index} at level {layer}"));
            }
            seen[index as usize] = true;
            if slot.state != SlotState::Free {
                return fail(format!("free list slot {index} not Free at level {layer}"));
            }
        }

        if layer > 0 {
            let count = state.ratio(layer - 1) as usize;
            for &begin in &level.span_free {
                if begin as usize + count > level.slots.len() {
                    return fail(format!("span {begin}+{count} out of range at level {layer}"));
                }
            }
        }

        for (index, slot) in level.slots.iter().enumerate() {
            if slot.mapped && slot.state != SlotState::InUse {
                return fail(format!("mapped slot {index} not InUse at level {layer}"));
            }
            if slot.state != SlotState::Split {
                continue;
            }
            if slot.child_layer as usize != layer + 1 {
                return fail(format!("split slot {index} missing child layer at level {layer}"));
            }
            let child_level = &state.levels[layer + 1];
            let count = state.ratio(layer) as usize;
            let begin = slot.child_begin as usize;
            if begin + count > child_level.slots.len() {
                return fail(format!("split child range out of bounds at level {layer}"));
            }
            for child in &child_level.slots[begin..begin + count] {
                if child.parent_slot as usize != index {
                    return fail(format!("child parent mismatch under slot {index} at level {layer}"));
                }
            }
        }
    }
    Ok(())
}

pub(super) fn stats_state(state: &AllocState) -> HierarchicalStats {
    let mut stats = HierarchicalStats {
        reserve_calls: state.reserve_calls,
        reserved_bytes: state.regions.iter().map(|r| r.size).sum(),
        mapped_slots: 0,
        free_slots: 0,
        split_slots: 0,
    };
    for level in &state.levels {
        for slot in &level.slots {
            if slot.mapped {
                stats.mapped_slots += 1;
            }
            match slot.state {
                SlotState::Free => stats.free_slots += 1,
                SlotState::Split => stats.split_slots += 1,
                SlotState::InUse => {}
            }
        }
    }
    stats
}
