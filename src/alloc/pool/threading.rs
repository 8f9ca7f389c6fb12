/*!
 * Threading Policies
 * Locking discipline for the segregated pool's mutable state
 */

use parking_lot::Mutex;
use std::cell::RefCell;

/// How the pool guards its freelists and reuse set.
///
/// The choice is a type parameter: single-threaded callers pay nothing, and
/// the compiler (not a runtime flag) enforces that an unlocked pool never
/// crosses threads.
pub trait ThreadingPolicy: 'static {
    type Cell<T: Send>;

    fn new_cell<T: Send>(value: T) -> Self::Cell<T>;

    fn with<T: Send, R>(cell: &Self::Cell<T>, f: impl FnOnce(&mut T) -> R) -> R;
}

/// No locking; the pool is single-threaded (`!Sync`)
pub struct NoLockThreading;

impl ThreadingPolicy for NoLockThreading {
    type Cell<T: Send> = RefCell<T>;

    fn new_cell<T: Send>(value: T) -> RefCell<T> {
        RefCell::new(value)
    }

    fn with<T: Send, R>(cell: &RefCell<T>, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut cell.borrow_mut())
    }
}

/// One global mutex over the whole pool state
pub struct MutexThreading;

impl ThreadingPolicy for MutexThreading {
    type Cell<T: Send> = Mutex<T>;

    fn new_cell<T: Send>(value: T) -> Mutex<T> {
        Mutex::new(value)
    }

    fn with<T: Send, R>(cell: &Mutex<T>, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut cell.lock())
    }
}
