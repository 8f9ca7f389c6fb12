/*!
 * Fast-Free Policy
 * Synchronous-free shortcut when the submitting stream already completed
 */

use crate::backend::{LaunchParams, Resource};

/// Decides whether a freed block can rejoin the freelist immediately,
/// skipping the deferred-reuse set.
pub trait FastFreePolicy<R: Resource>: Default + Send + Sync {
    fn can_free_now(&self, resource: &R, params: &LaunchParams) -> bool;
}

/// Query the block's completion token; already-completed work frees
/// synchronously
#[derive(Debug, Default)]
pub struct CompletionFastFree;

impl<R: Resource> FastFreePolicy<R> for CompletionFastFree {
    fn can_free_now(&self, resource: &R, params: &LaunchParams) -> bool {
        resource.is_completed(&params.token)
    }
}

/// Always defer; useful when completion queries are expensive
#[derive(Debug, Default)]
pub struct DisabledFastFree;

impl<R: Resource> FastFreePolicy<R> for DisabledFastFree {
    fn can_free_now(&self, _resource: &R, _params: &LaunchParams) -> bool {
        false
    }
}
