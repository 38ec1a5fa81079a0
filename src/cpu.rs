//! Processor identity.
//!
//! The lock table records owners by processor id and the execution-context
//! layer keeps one "current context" marker per processor. With the `std`
//! feature every thread is its own processor and receives an id the first
//! time it asks. The id returns to the pool when the thread exits, so at
//! most 255 threads can hold one at a time. Without `std` the target is
//! assumed to have `MAX_CORES` processors, of which only the first is
//! addressed.

use core::fmt;
use core::num::NonZeroU8;

/// Identifier of the executing processor. Never zero, so a zeroed lock
/// slot always reads as free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuId(NonZeroU8);

impl CpuId {
    /// Wrap a raw id; `None` for zero.
    pub const fn new(raw: u8) -> Option<Self> {
        match NonZeroU8::new(raw) {
            Some(id) => Some(CpuId(id)),
            None => None,
        }
    }

    /// The value stored in lock slots.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0.get()
    }

    /// Zero-based index for per-processor tables.
    #[inline]
    pub const fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu#{}", self.0)
    }
}

/// Id of the processor executing the caller.
#[inline]
pub fn current_id() -> CpuId {
    imp::current_id()
}

#[cfg(feature = "std")]
mod imp {
    use core::sync::atomic::{AtomicBool, Ordering};

    use super::CpuId;

    /// `IN_USE[i]` is set while a live thread holds id `i + 1`.
    static IN_USE: [AtomicBool; u8::MAX as usize] =
        [const { AtomicBool::new(false) }; u8::MAX as usize];

    /// A thread's claim on its id, given back when the thread exits.
    struct Claim(CpuId);

    impl Claim {
        fn new() -> Self {
            let index = IN_USE
                .iter()
                .position(|slot| {
                    slot.compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                        .is_ok()
                })
                .unwrap_or_else(|| panic!("more than {} threads need a processor id", u8::MAX));
            match CpuId::new(index as u8 + 1) {
                Some(id) => Claim(id),
                None => unreachable!(),
            }
        }
    }

    impl Drop for Claim {
        fn drop(&mut self) {
            IN_USE[self.0.index()].store(false, Ordering::Release);
        }
    }

    std::thread_local! {
        static THIS_CPU: Claim = Claim::new();
    }

    pub(super) fn current_id() -> CpuId {
        THIS_CPU.with(|claim| claim.0)
    }
}

#[cfg(not(feature = "std"))]
mod imp {
    use super::CpuId;

    const BOOT_CPU: CpuId = match CpuId::new(1) {
        Some(id) => id,
        None => unreachable!(),
    };

    pub(super) fn current_id() -> CpuId {
        BOOT_CPU
    }
}
