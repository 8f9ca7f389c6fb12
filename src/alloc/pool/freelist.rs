/*!
 * Size-Class Freelists
 * LIFO stacks of free blocks, one per power-of-two class
 */

use crate::alloc::types::MemoryBlock;
use crate::core::{BufferId, Size};

/// Per-class LIFO stacks of free sub-chunk blocks.
///
/// Classes are the powers of two from `min_block_size` through
/// `max_block_size`; block sizes are rounded up to the nearest class.
#[derive(Debug)]
pub(super) struct Freelist {
    min_block_size: Size,
    classes: Vec<Vec<MemoryBlock>>,
}

impl Freelist {
    /// Sizes must be validated by the pool configuration
    pub fn new(min_block_size: Size, max_block_size: Size) -> Self {
        debug_assert!(min_block_size.is_power_of_two());
        debug_assert!(max_block_size.is_power_of_two());
        debug_assert!(min_block_size <= max_block_size);
        let count = (max_block_size.trailing_zeros() - min_block_size.trailing_zeros()) as usize + 1;
        Self {
            min_block_size,
            classes: vec![Vec::new(); count],
        }
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Class index for a request; the caller guarantees
    /// `size <= max_block_size`
    pub fn class_index(&self, size: Size) -> usize {
        let rounded = size.max(self.min_block_size).next_power_of_two();
        (rounded.trailing_zeros() - self.min_block_size.trailing_zeros()) as usize
    }

    /// Block size served by a class
    pub fn block_size(&self, class: usize) -> Size {
        self.min_block_size << class
    }

    pub fn push(&mut self, class: usize, block: MemoryBlock) {
        self.classes[class].push(block);
    }

    pub fn pop(&mut self, class: usize) -> Option<MemoryBlock> {
        self.classes[class].pop()
    }

    pub fn len(&self, class: usize) -> usize {
        self.classes[class].len()
    }

    pub fn total_len(&self) -> usize {
        self.classes.iter().map(|c| c.len()).sum()
    }

    /// Remove every block belonging to `chunk`, returning them so the
    /// caller can reinsert if the chunk release is refused
    pub fn take_chunk_blocks(&mut self, class: usize, chunk: BufferId) -> Vec<MemoryBlock> {
        let stack = &mut self.classes[class];
        let mut taken = Vec::new();
        stack.retain(|block| {
            if block.id == chunk {
                taken.push(*block);
                false
            } else {
                true
            }
        });
        taken
    }

    pub fn reinsert(&mut self, class: usize, blocks: Vec<MemoryBlock>) {
        self.classes[class].extend(blocks);
    }
}
