/*!
 * Pool Manager Tests
 * Lease lifecycle, stale handles, shutdown idempotence, weak upgrades
 */

use pretty_assertions::assert_eq;
use runtime_alloc::core::{AllocError, AllocResult};
use runtime_alloc::lease::{PoolTraits, SharedControl, UniqueControl, WeakControl};
use runtime_alloc::{PoolManager, PoolManagerConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Traits double counting create/destroy calls
struct CountingTraits {
    created: Arc<AtomicUsize>,
    destroyed: Arc<AtomicUsize>,
}

impl CountingTraits {
    fn new() -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let destroyed = Arc::new(AtomicUsize::new(0));
        (
            Self {
                created: Arc::clone(&created),
                destroyed: Arc::clone(&destroyed),
            },
            created,
            destroyed,
        )
    }
}

impl PoolTraits for CountingTraits {
    type Payload = u64;
    type Control = UniqueControl;
    type Request = u64;

    const NAME: &'static str = "counting manager";

    fn create(&self, payload: &mut u64, request: &u64) -> AllocResult<()> {
        if *request == u64::MAX {
            return Err(AllocError::OperationFailed(
                "counting manager: backend refused".into(),
            ));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        *payload = *request;
        Ok(())
    }

    fn destroy(&self, payload: &mut u64) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        *payload = 0;
    }
}

struct SharedTraits;

impl PoolTraits for SharedTraits {
    type Payload = u64;
    type Control = SharedControl;
    type Request = u64;

    const NAME: &'static str = "shared manager";

    fn create(&self, payload: &mut u64, request: &u64) -> AllocResult<()> {
        *payload = *request;
        Ok(())
    }

    fn destroy(&self, payload: &mut u64) {
        *payload = 0;
    }
}

struct WeakTraits;

impl PoolTraits for WeakTraits {
    type Payload = u64;
    type Control = WeakControl;
    type Request = u64;

    const NAME: &'static str = "weak manager";

    fn create(&self, payload: &mut u64, request: &u64) -> AllocResult<()> {
        *payload = *request;
        Ok(())
    }

    fn destroy(&self, payload: &mut u64) {
        *payload = 0;
    }
}

fn configured<P: PoolTraits>(traits: P) -> PoolManager<P> {
    let manager = PoolManager::new(traits);
    manager
        .configure(PoolManagerConfig {
            capacity: 4,
            growth_chunk: 4,
        })
        .unwrap();
    manager
}

// ============================================================================
// Configuration and shutdown
// ============================================================================

#[test]
fn test_configure_rejects_zero_capacity() {
    let (traits, _, _) = CountingTraits::new();
    let manager = PoolManager::new(traits);
    let result = manager.configure(PoolManagerConfig {
        capacity: 0,
        growth_chunk: 4,
    });
    assert!(matches!(result, Err(AllocError::InvalidArgument(_))));

    let result = manager.configure(PoolManagerConfig {
        capacity: 4,
        growth_chunk: 0,
    });
    assert!(matches!(result, Err(AllocError::InvalidArgument(_))));
}

#[test]
fn test_acquire_before_configure_is_invalid_state() {
    let (traits, _, _) = CountingTraits::new();
    let manager = PoolManager::new(traits);
    assert!(matches!(
        manager.acquire(1),
        Err(AllocError::InvalidState(_))
    ));
}

#[test]
fn test_shutdown_is_idempotent_and_configure_after_is_permitted() {
    let (traits, _, destroyed) = CountingTraits::new();
    let manager = configured(traits);

    let lease = manager.acquire(7).unwrap();
    std::mem::forget(lease);

    manager.shutdown();
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    manager.shutdown();
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);

    // Safe before configure too, and configure works again afterwards.
    manager
        .configure(PoolManagerConfig {
            capacity: 2,
            growth_chunk: 2,
        })
        .unwrap();
    let lease = manager.acquire(9).unwrap();
    assert_eq!(*lease.payload(), 9);
}

#[test]
fn test_shutdown_before_configure_is_safe() {
    let (traits, _, destroyed) = CountingTraits::new();
    let manager = PoolManager::new(traits);
    manager.shutdown();
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Lease lifecycle
// ============================================================================

#[test]
fn test_lease_drop_destroys_payload() {
    let (traits, created, destroyed) = CountingTraits::new();
    let manager = configured(traits);

    {
        let lease = manager.acquire(42).unwrap();
        assert_eq!(*lease.payload(), 42);
        assert_eq!(manager.live_count(), 1);
    }
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(manager.live_count(), 0);
}

#[test]
fn test_lease_release_is_idempotent() {
    let (traits, _, destroyed) = CountingTraits::new();
    let manager = configured(traits);

    let mut lease = manager.acquire(1).unwrap();
    manager.release(&mut lease);
    manager.release(&mut lease);
    drop(lease);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_create_failure_surfaces_and_keeps_pool_clean() {
    let (traits, created, _) = CountingTraits::new();
    let manager = configured(traits);

    assert!(matches!(
        manager.acquire(u64::MAX),
        Err(AllocError::OperationFailed(_))
    ));
    assert_eq!(created.load(Ordering::SeqCst), 0);
    assert_eq!(manager.live_count(), 0);

    // The refused slot is immediately usable again.
    let lease = manager.acquire(5).unwrap();
    assert_eq!(*lease.payload(), 5);
}

// ============================================================================
// Stale handles (generation checks)
// ============================================================================

#[test]
fn test_stale_handle_yields_invalid_state() {
    let (traits, _, _) = CountingTraits::new();
    let manager = configured(traits);

    let mut lease = manager.acquire(11).unwrap();
    let stale = lease.handle();
    manager.release(&mut lease);

    // Same slot, new generation.
    let fresh = manager.acquire(22).unwrap();
    assert_eq!(fresh.handle().index(), stale.index());
    assert_ne!(fresh.handle().generation(), stale.generation());

    match manager.payload(stale) {
        Err(AllocError::InvalidState(message)) => assert!(message.contains("stale")),
        other => panic!("expected InvalidState, got {other:?}"),
    }
    assert_eq!(manager.payload(fresh.handle()).unwrap(), 22);
}

#[test]
fn test_handles_after_shutdown_are_stale() {
    let (traits, _, _) = CountingTraits::new();
    let manager = configured(traits);

    let lease = manager.acquire(3).unwrap();
    let handle = lease.handle();
    std::mem::forget(lease);

    manager.shutdown();
    assert!(matches!(
        manager.payload(handle),
        Err(AllocError::InvalidState(_))
    ));
}

// ============================================================================
// Shared and weak disciplines
// ============================================================================

#[test]
fn test_shared_lease_retain_release() {
    let manager = configured(SharedTraits);

    let first = manager.acquire(100).unwrap();
    let second = manager.retain(first.handle()).unwrap();
    assert_eq!(*second.payload(), 100);

    drop(first);
    // Still alive through the second lease.
    assert_eq!(manager.payload(second.handle()).unwrap(), 100);
    let handle = second.handle();
    drop(second);
    assert!(manager.payload(handle).is_err());
}

#[test]
fn test_weak_upgrade_while_alive_only() {
    let manager = configured(WeakTraits);

    let strong = manager.acquire(55).unwrap();
    let weak = manager.downgrade(&strong).unwrap();

    let upgraded = manager.upgrade(&weak).unwrap();
    assert_eq!(*upgraded.payload(), 55);

    drop(strong);
    drop(upgraded);
    assert!(matches!(
        manager.upgrade(&weak),
        Err(AllocError::InvalidState(_))
    ));
}
