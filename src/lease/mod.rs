/*!
 * Lease Substrate
 *
 * Reference-counted, generation-tagged resource handles over pooled slots.
 *
 * Every pooled runtime resource (buffers, queues, heaps, ...) is owned by a
 * manager and handed out as a move-only [`Lease`] holding one reference on a
 * per-slot control block. Handles are arena indices plus a generation tag, so
 * stale references are detected instead of touching reused payloads and
 * reference cycles are impossible by construction.
 */

pub mod block_vec;
pub mod control;
pub mod handle;
pub mod lease;
pub mod manager;
pub mod slot_pool;

pub use block_vec::BlockVec;
pub use control::{
    ControlBlock, LockableSharedControl, RawControl, ScopedLock, SharedControl, UniqueControl,
    WeakCapable, WeakControl,
};
pub use handle::Handle;
pub use lease::{Lease, WeakLease};
pub use manager::{PoolManager, PoolManagerConfig};
pub use slot_pool::{PoolTraits, SlotPool};
