/*!
 * Control Blocks
 *
 * Per-slot lifetime disciplines. Each discipline is a distinct type behind
 * the common [`ControlBlock`] trait; selection happens at compile time
 * through the pool's traits, never through dynamic dispatch.
 */

use std::sync::atomic::{fence, AtomicBool, AtomicU32, Ordering};

/// Common capability set of every control block.
///
/// `release` returns `true` exactly when the caller must destroy the payload
/// and return the slot to its pool.
pub trait ControlBlock: Default + Send + Sync {
    /// Take one reference. Returns `false` if the discipline refuses
    /// (e.g. a unique block that is already held).
    fn acquire(&self) -> bool;

    /// Drop one reference. `true` iff this was the last one.
    fn release(&self) -> bool;

    fn is_alive(&self) -> bool;
}

/// No bookkeeping: lifetime is managed externally.
///
/// Acquire always succeeds and release never signals destruction.
#[derive(Debug, Default)]
pub struct RawControl;

impl ControlBlock for RawControl {
    fn acquire(&self) -> bool {
        true
    }

    fn release(&self) -> bool {
        false
    }

    fn is_alive(&self) -> bool {
        true
    }
}

/// At most one outstanding lease per slot, CAS-guarded.
#[derive(Debug, Default)]
pub struct UniqueControl {
    in_use: AtomicBool,
}

impl ControlBlock for UniqueControl {
    fn acquire(&self) -> bool {
        self.in_use
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn release(&self) -> bool {
        self.in_use
            .compare_exchange(true, false, Ordering::Release, Ordering::Relaxed)
            .is_ok()
    }

    fn is_alive(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }
}

/// Atomic strong count; the drop to zero signals destruction.
#[derive(Debug, Default)]
pub struct SharedControl {
    strong: AtomicU32,
}

impl SharedControl {
    pub fn count(&self) -> u32 {
        self.strong.load(Ordering::Acquire)
    }
}

impl ControlBlock for SharedControl {
    fn acquire(&self) -> bool {
        self.strong.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn release(&self) -> bool {
        if self.strong.fetch_sub(1, Ordering::Release) == 1 {
            // Pair with the writes of every releasing holder before the
            // payload is destroyed.
            fence(Ordering::Acquire);
            return true;
        }
        false
    }

    fn is_alive(&self) -> bool {
        self.count() > 0
    }
}

/// Shared ownership plus an exclusive lock bit.
///
/// Shutdown requires both no references and no holder of the lock.
#[derive(Debug, Default)]
pub struct LockableSharedControl {
    inner: SharedControl,
    locked: AtomicBool,
}

impl LockableSharedControl {
    pub fn count(&self) -> u32 {
        self.inner.count()
    }

    /// Attempt the exclusive lock, returning an RAII guard on success
    pub fn try_lock(&self) -> Option<ScopedLock<'_>> {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
            .then_some(ScopedLock { control: self })
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    pub fn can_shutdown(&self) -> bool {
        self.count() == 0 && !self.is_locked()
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

impl ControlBlock for LockableSharedControl {
    fn acquire(&self) -> bool {
        self.inner.acquire()
    }

    fn release(&self) -> bool {
        let last = self.inner.release();
        if last && self.is_locked() {
            // Last holder out clears a lock left behind.
            self.unlock();
        }
        last
    }

    fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }
}

/// RAII exclusive access to a [`LockableSharedControl`]; unlocks on drop,
/// including unwind.
#[must_use = "the lock is released when the guard is dropped"]
pub struct ScopedLock<'a> {
    control: &'a LockableSharedControl,
}

impl Drop for ScopedLock<'_> {
    fn drop(&mut self) {
        self.control.unlock();
    }
}

/// Weak-reference capability on top of a control block.
///
/// Weak references keep the slot's bookkeeping alive but not the payload;
/// upgrading succeeds only while the strong count is above zero.
pub trait WeakCapable: ControlBlock {
    fn weak_retain(&self);

    /// Drop a weak reference. `true` iff it was the last weak reference and
    /// the strong count is already zero.
    fn weak_release(&self) -> bool;

    /// Take a strong reference iff the payload is still alive
    fn upgrade(&self) -> bool;
}

/// Shared ownership plus a weak count.
#[derive(Debug, Default)]
pub struct WeakControl {
    strong: AtomicU32,
    weak: AtomicU32,
}

impl WeakControl {
    pub fn strong_count(&self) -> u32 {
        self.strong.load(Ordering::Acquire)
    }

    pub fn weak_count(&self) -> u32 {
        self.weak.load(Ordering::Acquire)
    }
}

impl WeakCapable for WeakControl {
    fn weak_retain(&self) {
        self.weak.fetch_add(1, Ordering::Relaxed);
    }

    fn weak_release(&self) -> bool {
        self.weak.fetch_sub(1, Ordering::Release) == 1 && self.strong_count() == 0
    }

    fn upgrade(&self) -> bool {
        let mut current = self.strong.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return false;
            }
            match self.strong.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }
}

impl ControlBlock for WeakControl {
    fn acquire(&self) -> bool {
        self.strong.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn release(&self) -> bool {
        if self.strong.fetch_sub(1, Ordering::Release) == 1 {
            fence(Ordering::Acquire);
            return true;
        }
        false
    }

    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}
