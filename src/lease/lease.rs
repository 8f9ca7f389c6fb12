/*!
 * Leases
 * Move-only handles that release their control-block reference on drop
 */

use super::control::WeakCapable;
use super::handle::Handle;
use super::manager::ManagerInner;
use super::slot_pool::PoolTraits;
use std::sync::Arc;

/// User-facing affine handle owning one reference on a pooled slot.
///
/// The payload is cached at acquire time for lock-free access. Dropping the
/// lease releases the reference (including on unwind); the last release runs
/// the manager's destroy hook and returns the slot to its pool. Explicit
/// [`Lease::release`] is idempotent.
pub struct Lease<P: PoolTraits> {
    manager: Option<Arc<ManagerInner<P>>>,
    handle: Handle<P>,
    payload: P::Payload,
}

impl<P: PoolTraits> Lease<P> {
    pub(super) fn new(
        manager: Arc<ManagerInner<P>>,
        handle: Handle<P>,
        payload: P::Payload,
    ) -> Self {
        Self {
            manager: Some(manager),
            handle,
            payload,
        }
    }

    /// An empty lease bound to nothing; releasing it is a no-op
    pub fn invalid() -> Self {
        Self {
            manager: None,
            handle: Handle::invalid(),
            payload: P::Payload::default(),
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.manager.is_some() && self.handle.is_valid()
    }

    #[inline]
    pub fn handle(&self) -> Handle<P> {
        self.handle
    }

    /// Cached payload as of acquire time
    #[inline]
    pub fn payload(&self) -> &P::Payload {
        &self.payload
    }

    /// Release early; safe to call multiple times
    pub fn release(&mut self) {
        if let Some(manager) = self.manager.take() {
            manager.release_handle(self.handle);
        }
    }
}

impl<P: PoolTraits> Drop for Lease<P> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Non-owning companion to a shared lease.
///
/// Holds a weak reference on the slot's control block; upgrading produces a
/// strong lease iff the payload is still alive at that moment.
pub struct WeakLease<P: PoolTraits>
where
    P::Control: WeakCapable,
{
    manager: Option<Arc<ManagerInner<P>>>,
    handle: Handle<P>,
}

impl<P: PoolTraits> WeakLease<P>
where
    P::Control: WeakCapable,
{
    pub(super) fn new(manager: Arc<ManagerInner<P>>, handle: Handle<P>) -> Self {
        Self {
            manager: Some(manager),
            handle,
        }
    }

    #[inline]
    pub fn handle(&self) -> Handle<P> {
        self.handle
    }

    /// Drop the weak reference early; safe to call multiple times
    pub fn release(&mut self) {
        if let Some(manager) = self.manager.take() {
            manager.weak_release_handle(self.handle);
        }
    }

    pub(super) fn manager(&self) -> Option<&Arc<ManagerInner<P>>> {
        self.manager.as_ref()
    }
}

impl<P: PoolTraits> Drop for WeakLease<P>
where
    P::Control: WeakCapable,
{
    fn drop(&mut self) {
        self.release();
    }
}
