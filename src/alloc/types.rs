/*!
 * Allocator Types
 * Blocks handed between locators, pools, and callers
 */

use crate::backend::BufferView;
use crate::core::BufferId;
use serde::{Deserialize, Serialize};

/// A span handed out by a chunk locator or pool.
///
/// The id encodes the providing policy (direct chunk, hierarchical slot, or
/// large pass-through); the view describes the memory itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlock {
    pub id: BufferId,
    pub view: BufferView,
}

impl MemoryBlock {
    pub const fn new(id: BufferId, view: BufferView) -> Self {
        Self { id, view }
    }

    /// The empty block returned for zero-sized requests
    pub const fn empty() -> Self {
        Self {
            id: BufferId::invalid(),
            view: BufferView::empty(),
        }
    }

    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.view.is_valid()
    }

    #[inline]
    pub const fn is_large(&self) -> bool {
        self.id.is_large()
    }
}
