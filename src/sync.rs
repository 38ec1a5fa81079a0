//! # Synchronization Primitives
//!
//! A fixed table of binary spinlocks. Each slot holds zero when free or the
//! id of the owning processor. Acquisition is a single compare-and-exchange
//! retried until it succeeds. There is no timeout, fairness or priority
//! inheritance. Release checks ownership and reports misuse as an error
//! instead of aborting.
//!
//! Shared scheduler state is only touched through `Lock::lock()`, whose
//! guard releases the slot on every exit path.
//!
//! # Usage
//! ```ignore
//! let guard = Lock::new(SCHEDULER_LOCK_ID).lock();
//! // Access shared state safely
//! drop(guard);
//! ```

use core::marker::PhantomData;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::arch;
use crate::config::NUM_LOCKS;
use crate::cpu::{self, CpuId};
use crate::error::LockError;

const FREE: u8 = 0;

static LOCKS: [AtomicU8; NUM_LOCKS] = [const { AtomicU8::new(FREE) }; NUM_LOCKS];

fn slot(id: usize) -> Result<&'static AtomicU8, LockError> {
    LOCKS.get(id).ok_or(LockError::OutOfRange(id))
}

/// Spin until lock `id` is owned by the calling processor.
///
/// The slot is not re-entrant: acquiring a lock the caller already holds
/// never returns.
pub fn acquire(id: usize) -> Result<(), LockError> {
    let slot = slot(id)?;
    let me = cpu::current_id().get();
    while slot
        .compare_exchange_weak(FREE, me, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        arch::relax();
    }
    Ok(())
}

/// Release lock `id`. Fails without touching the slot if the caller is not
/// its owner.
pub fn release(id: usize) -> Result<(), LockError> {
    let slot = slot(id)?;
    let caller = cpu::current_id();
    let held = slot.load(Ordering::Relaxed);
    if held != caller.get() {
        return Err(LockError::NotOwner {
            id,
            caller,
            owner: CpuId::new(held),
        });
    }
    slot.store(FREE, Ordering::Release);
    arch::signal();
    Ok(())
}

/// Current owner of lock `id`, `None` when free.
pub fn owner(id: usize) -> Result<Option<CpuId>, LockError> {
    Ok(CpuId::new(slot(id)?.load(Ordering::Relaxed)))
}

/// Handle to one slot of the lock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lock {
    id: usize,
}

impl Lock {
    /// # Panics
    /// If `id` is outside the lock table (a compile-time error in const
    /// contexts).
    pub const fn new(id: usize) -> Self {
        assert!(id < NUM_LOCKS, "lock id outside the lock table");
        Lock { id }
    }

    pub const fn id(self) -> usize {
        self.id
    }

    /// Acquire the slot for the lifetime of the returned guard.
    pub fn lock(self) -> LockGuard {
        // The id was range-checked in `new`.
        let _ = acquire(self.id);
        LockGuard {
            id: self.id,
            _not_send: PhantomData,
        }
    }

    /// Whether the calling processor holds this slot.
    pub fn is_held_by_me(self) -> bool {
        matches!(owner(self.id), Ok(Some(id)) if id == cpu::current_id())
    }
}

/// Scoped ownership of a lock slot. Released on drop, including during
/// unwinding. Pinned to the processor that acquired it.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    id: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = release(self.id) {
            log::error!("lock guard release failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Ids 0, 1 and SCHEDULER_LOCK_ID are left to the scheduler tests.
    const TEST_LOCK: usize = 5;
    const FOREIGN_LOCK: usize = 6;
    const GUARD_LOCK: usize = 7;
    const PANIC_LOCK: usize = 8;

    #[test]
    fn test_acquire_release() {
        acquire(TEST_LOCK).unwrap();
        assert_eq!(owner(TEST_LOCK).unwrap(), Some(cpu::current_id()));
        release(TEST_LOCK).unwrap();
        assert_eq!(owner(TEST_LOCK).unwrap(), None);
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(acquire(NUM_LOCKS), Err(LockError::OutOfRange(NUM_LOCKS)));
        assert_eq!(release(NUM_LOCKS + 3), Err(LockError::OutOfRange(NUM_LOCKS + 3)));
        assert_eq!(LockError::OutOfRange(NUM_LOCKS).status(), -1);
    }

    #[test]
    fn test_release_by_non_owner_leaves_slot() {
        let holder = std::thread::spawn(|| {
            acquire(FOREIGN_LOCK).unwrap();
            cpu::current_id()
        })
        .join()
        .unwrap();

        let err = release(FOREIGN_LOCK).unwrap_err();
        assert_eq!(
            err,
            LockError::NotOwner {
                id: FOREIGN_LOCK,
                caller: cpu::current_id(),
                owner: Some(holder),
            }
        );
        assert!(err.status() < 0);
        assert_eq!(owner(FOREIGN_LOCK).unwrap(), Some(holder));

        // Releasing a free slot is also misuse.
        LOCKS[FOREIGN_LOCK].store(FREE, Ordering::Relaxed);
        assert!(matches!(
            release(FOREIGN_LOCK),
            Err(LockError::NotOwner { owner: None, .. })
        ));
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let lock = Lock::new(GUARD_LOCK);
        {
            let _guard = lock.lock();
            assert!(lock.is_held_by_me());
        }
        assert!(!lock.is_held_by_me());
        assert_eq!(owner(GUARD_LOCK).unwrap(), None);
    }

    #[test]
    fn test_guard_releases_on_unwind() {
        let lock = Lock::new(PANIC_LOCK);
        let result = std::panic::catch_unwind(|| {
            let _guard = lock.lock();
            panic!("boom");
        });
        assert!(result.is_err());
        assert_eq!(owner(PANIC_LOCK).unwrap(), None);
    }

    #[test]
    fn test_mutual_exclusion_across_threads() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::Arc;

        const LOCK_ID: usize = 9;
        let inside = Arc::new(AtomicUsize::new(0));
        let total = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let inside = Arc::clone(&inside);
                let total = Arc::clone(&total);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let _guard = Lock::new(LOCK_ID).lock();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        total.fetch_add(1, Ordering::Relaxed);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(total.load(Ordering::Relaxed), 2000);
    }
}
