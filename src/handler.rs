//! # Wait-Handler Protocol
//!
//! The capability set a synchronization primitive implements to plug into
//! the scheduler without the scheduler knowing its internals:
//!
//! - `attempt`: try to take or give one unit of the guarded resource right
//!   now, from inside the waiting task
//! - `poll_resume`: the same check, issued by the run loop for a task that
//!   is blocked on this handler
//! - `maintain`: once per run-loop pass, independent of any task
//!
//! A granted `attempt` or `poll_resume` consumes or produces exactly one
//! unit; a blocked one has no observable side effect. There is no blocking
//! primitive here: blocking is `scheduler::wait`, built on yielding.

use core::fmt;
use core::ptr;

use crate::task::Task;

/// Result of `attempt` / `poll_resume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operation was performed; the task may continue.
    Granted,
    /// Nothing happened; the task has to keep waiting.
    Blocked,
}

impl Outcome {
    #[inline]
    pub const fn is_granted(self) -> bool {
        matches!(self, Outcome::Granted)
    }
}

impl From<bool> for Outcome {
    fn from(granted: bool) -> Self {
        if granted {
            Outcome::Granted
        } else {
            Outcome::Blocked
        }
    }
}

/// Opaque argument a task hands to its handler when it waits. Usually the
/// address of a request living on the waiting task's stack, which stays
/// valid for as long as the task is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitArg(*const ());

impl WaitArg {
    pub const NONE: WaitArg = WaitArg(ptr::null());

    /// Point at `value`.
    pub fn new<T>(value: &T) -> Self {
        WaitArg(value as *const T as *const ())
    }

    pub const fn from_raw(raw: *const ()) -> Self {
        WaitArg(raw)
    }

    pub const fn as_ptr(self) -> *const () {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0.is_null()
    }

    /// Reinterpret the argument as the request type it was created from.
    ///
    /// # Safety
    /// The argument must come from `WaitArg::new::<T>` on a value that is
    /// still alive.
    pub unsafe fn get<'a, T>(self) -> &'a T {
        &*(self.0 as *const T)
    }
}

/// A class of synchronization resource the scheduler can wait on.
///
/// Methods run under the scheduler lock: they must not spawn, register,
/// wait or yield.
pub trait WaitHandler: Sync {
    /// Identifier used in task states and logs.
    fn name(&self) -> &'static str;

    /// Try the operation described by `arg` on behalf of `task`, which is
    /// the caller.
    fn attempt(&self, task: Task, arg: WaitArg) -> Outcome;

    /// Retry the operation for `task`, which is blocked on this handler.
    fn poll_resume(&self, task: Task, arg: WaitArg) -> Outcome;

    /// Housekeeping, once per run-loop pass before tasks are scanned.
    fn maintain(&self) {}
}

impl fmt::Debug for dyn WaitHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WaitHandler").field(&self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_bool() {
        assert_eq!(Outcome::from(true), Outcome::Granted);
        assert_eq!(Outcome::from(false), Outcome::Blocked);
        assert!(Outcome::Granted.is_granted());
        assert!(!Outcome::Blocked.is_granted());
    }

    #[test]
    fn test_wait_arg_round_trip() {
        let request = (3u32, 'x');
        let arg = WaitArg::new(&request);
        assert!(!arg.is_none());
        // SAFETY: created from a live `(u32, char)`.
        assert_eq!(unsafe { arg.get::<(u32, char)>() }, &request);
        assert!(WaitArg::NONE.is_none());
        assert_eq!(WaitArg::from_raw(arg.as_ptr()), arg);
    }
}
