/*!
 * Reuse Policies
 * Deferred reintroduction of freed blocks gated on completion tokens
 */

use crate::alloc::types::MemoryBlock;
use crate::backend::{Resource, ReuseToken};

/// Holds asynchronously freed blocks until the backend reports their
/// guarding tokens complete.
///
/// A block never rejoins the freelist before `is_completed` has been
/// observed true for its token.
pub trait ReusePolicy<R: Resource>: Default + Send {
    /// Whether freed blocks are held back at all. When `false` the pool
    /// frees synchronously and `defer`/`drain` are never called.
    const DEFERS: bool;

    fn defer(&mut self, block: MemoryBlock, class: usize, token: ReuseToken);

    /// Move every completed entry out of the pending set
    fn drain(&mut self, resource: &R) -> Vec<(MemoryBlock, usize)>;

    fn pending_len(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct PendingBlock {
    block: MemoryBlock,
    class: usize,
    token: ReuseToken,
}

/// Token-gated deferral; drained on every allocate and on explicit flush
#[derive(Debug, Default)]
pub struct DeferredReuse {
    pending: Vec<PendingBlock>,
}

impl<R: Resource> ReusePolicy<R> for DeferredReuse {
    const DEFERS: bool = true;

    fn defer(&mut self, block: MemoryBlock, class: usize, token: ReuseToken) {
        self.pending.push(PendingBlock {
            block,
            class,
            token,
        });
    }

    fn drain(&mut self, resource: &R) -> Vec<(MemoryBlock, usize)> {
        let mut completed = Vec::new();
        self.pending.retain(|entry| {
            if resource.is_completed(&entry.token) {
                completed.push((entry.block, entry.class));
                false
            } else {
                true
            }
        });
        completed
    }

    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// No deferral; every free is synchronous
#[derive(Debug, Default)]
pub struct ImmediateReuse;

impl<R: Resource> ReusePolicy<R> for ImmediateReuse {
    const DEFERS: bool = false;

    fn defer(&mut self, _block: MemoryBlock, _class: usize, _token: ReuseToken) {
        debug_assert!(false, "immediate reuse never defers");
    }

    fn drain(&mut self, _resource: &R) -> Vec<(MemoryBlock, usize)> {
        Vec::new()
    }

    fn pending_len(&self) -> usize {
        0
    }
}
