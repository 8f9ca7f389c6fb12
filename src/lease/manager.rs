/*!
 * Pool Manager
 * Configure/acquire/release/shutdown surface over one slot pool
 */

use super::control::WeakCapable;
use super::handle::Handle;
use super::lease::{Lease, WeakLease};
use super::slot_pool::{PoolTraits, SlotPool};
use crate::core::{AllocError, AllocResult};
use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Manager capacity configuration.
///
/// Zero capacities and zero growth chunks are rejected with
/// `InvalidArgument`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolManagerConfig {
    /// Slots provisioned up front
    pub capacity: usize,
    /// Slots added when the pool runs dry
    pub growth_chunk: usize,
}

impl Default for PoolManagerConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            growth_chunk: 16,
        }
    }
}

struct ManagerState<P: PoolTraits> {
    pool: SlotPool<P>,
    configured: bool,
    growth_chunk: usize,
}

pub(super) struct ManagerInner<P: PoolTraits> {
    traits: P,
    state: Mutex<ManagerState<P>>,
}

impl<P: PoolTraits> ManagerInner<P> {
    /// Lease-drop path: errors (e.g. stale handles after shutdown) are
    /// logged and swallowed so teardown can never fault.
    pub(super) fn release_handle(&self, handle: Handle<P>) {
        let mut state = self.state.lock();
        match state.pool.release(&self.traits, handle) {
            Ok(destroyed) => {
                if destroyed {
                    debug!("{}: slot {} destroyed on release", P::NAME, handle.index());
                }
            }
            Err(err) => debug!("{}: release of {handle:?} ignored: {err}", P::NAME),
        }
    }
}

impl<P: PoolTraits> ManagerInner<P>
where
    P::Control: WeakCapable,
{
    pub(super) fn weak_release_handle(&self, handle: Handle<P>) {
        let state = self.state.lock();
        if let Ok(control) = state.pool.control(handle) {
            control.weak_release();
        }
    }
}

/// Manager owning one slot pool.
///
/// Mutation of the pool is serialized by a single mutex; control-block
/// counters themselves are atomic, so lease clones and drops contend only on
/// the structural free-list operations.
pub struct PoolManager<P: PoolTraits> {
    inner: Arc<ManagerInner<P>>,
}

impl<P: PoolTraits> Clone for PoolManager<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: PoolTraits> PoolManager<P> {
    /// Slot-storage segment size; slots never move once provisioned
    const SLOT_BLOCK: usize = 64;

    pub fn new(traits: P) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                traits,
                state: Mutex::new(ManagerState {
                    pool: SlotPool::new(Self::SLOT_BLOCK),
                    configured: false,
                    growth_chunk: 0,
                }),
            }),
        }
    }

    /// Provision capacity. Permitted again after `shutdown`.
    pub fn configure(&self, config: PoolManagerConfig) -> AllocResult<()> {
        if config.capacity == 0 {
            return Err(AllocError::InvalidArgument(format!(
                "{}: zero capacity",
                P::NAME
            )));
        }
        if config.growth_chunk == 0 {
            return Err(AllocError::InvalidArgument(format!(
                "{}: zero growth chunk",
                P::NAME
            )));
        }
        let mut state = self.inner.state.lock();
        state.pool.ensure_capacity(config.capacity);
        state.growth_chunk = config.growth_chunk;
        state.configured = true;
        info!(
            "{}: configured with capacity {} (growth chunk {})",
            P::NAME,
            config.capacity,
            config.growth_chunk
        );
        Ok(())
    }

    /// Release every outstanding control block. Idempotent; safe to call
    /// before or after `configure`. Never faults: backend errors during
    /// payload teardown are logged by the destroy hook and suppressed.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        let destroyed = state.pool.destroy_all(&self.inner.traits);
        state.configured = false;
        if destroyed > 0 {
            info!("{}: shutdown destroyed {destroyed} slots", P::NAME);
        }
    }

    /// Acquire a lease over a freshly created payload
    pub fn acquire(&self, request: P::Request) -> AllocResult<Lease<P>> {
        let mut state = self.inner.state.lock();
        if !state.configured {
            return Err(AllocError::InvalidState(format!(
                "{}: not configured",
                P::NAME
            )));
        }
        let growth = state.growth_chunk;
        let handle = state.pool.acquire(&self.inner.traits, &request, growth)?;
        let payload = state.pool.payload(handle)?;
        Ok(Lease::new(Arc::clone(&self.inner), handle, payload))
    }

    /// Take an additional reference on an existing lease's slot.
    ///
    /// Fails with `InvalidState` for disciplines refusing multiple holders.
    pub fn retain(&self, handle: Handle<P>) -> AllocResult<Lease<P>> {
        let mut state = self.inner.state.lock();
        state.pool.retain(handle)?;
        let payload = state.pool.payload(handle)?;
        Ok(Lease::new(Arc::clone(&self.inner), handle, payload))
    }

    /// Release a lease explicitly; idempotent and safe on already-released
    /// leases.
    pub fn release(&self, lease: &mut Lease<P>) {
        lease.release();
    }

    /// Clone the payload behind a handle, verifying the generation
    pub fn payload(&self, handle: Handle<P>) -> AllocResult<P::Payload> {
        self.inner.state.lock().pool.payload(handle)
    }

    /// Live slot count
    pub fn live_count(&self) -> usize {
        self.inner.state.lock().pool.live_count()
    }

    pub fn is_configured(&self) -> bool {
        self.inner.state.lock().configured
    }
}

impl<P: PoolTraits> PoolManager<P>
where
    P::Control: WeakCapable,
{
    /// Create a weak companion to a strong lease
    pub fn downgrade(&self, lease: &Lease<P>) -> AllocResult<WeakLease<P>> {
        let state = self.inner.state.lock();
        let control = state.pool.control(lease.handle())?;
        control.weak_retain();
        Ok(WeakLease::new(Arc::clone(&self.inner), lease.handle()))
    }

    /// Upgrade a weak lease; fails with `InvalidState` once the payload died
    pub fn upgrade(&self, weak: &WeakLease<P>) -> AllocResult<Lease<P>> {
        let Some(inner) = weak.manager() else {
            return Err(AllocError::InvalidState(format!(
                "{}: upgrade of released weak lease",
                P::NAME
            )));
        };
        let state = inner.state.lock();
        let control = state.pool.control(weak.handle())?;
        if !control.upgrade() {
            return Err(AllocError::InvalidState(format!(
                "{}: upgrade of dead payload",
                P::NAME
            )));
        }
        let payload = state.pool.payload(weak.handle())?;
        Ok(Lease::new(Arc::clone(inner), weak.handle(), payload))
    }
}
