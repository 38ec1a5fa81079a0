//! # Pass Clock
//!
//! A wait handler that counts run-loop passes. Its `maintain` hook advances
//! the counter once per pass, and [`PassClock::sleep`] parks the calling
//! task until the counter has moved far enough.
//!
//! The counter wraps; deadlines are compared by elapsed distance, so a
//! sleep stays correct across the wrap as long as it is shorter than
//! `usize::MAX` passes.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::handler::{Outcome, WaitArg, WaitHandler};
use crate::scheduler;
use crate::task::Task;

/// Pass counter usable as a sleep timer. Register it with the scheduler
/// that runs the sleeping tasks, or it never advances.
#[derive(Debug)]
pub struct PassClock {
    passes: AtomicUsize,
}

struct Sleep {
    start: usize,
    passes: usize,
}

impl PassClock {
    pub const fn new() -> Self {
        PassClock {
            passes: AtomicUsize::new(0),
        }
    }

    /// Passes maintained so far.
    pub fn now(&self) -> usize {
        self.passes.load(Ordering::Acquire)
    }

    /// Block the calling task for at least `passes` run-loop passes.
    /// `sleep(0)` returns immediately.
    ///
    /// # Panics
    /// Outside a scheduler task.
    pub fn sleep(&'static self, passes: usize) {
        let request = Sleep {
            start: self.now(),
            passes,
        };
        scheduler::wait(Some(self), WaitArg::new(&request));
    }

    fn elapsed(&self, arg: WaitArg) -> Outcome {
        // SAFETY: `sleep` is the only waiter on this handler and keeps its
        // request alive while blocked.
        let request = unsafe { arg.get::<Sleep>() };
        (self.now().wrapping_sub(request.start) >= request.passes).into()
    }
}

impl Default for PassClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitHandler for PassClock {
    fn name(&self) -> &'static str {
        "pass-clock"
    }

    fn attempt(&self, _task: Task, arg: WaitArg) -> Outcome {
        self.elapsed(arg)
    }

    fn poll_resume(&self, _task: Task, arg: WaitArg) -> Outcome {
        self.elapsed(arg)
    }

    fn maintain(&self) {
        self.passes.fetch_add(1, Ordering::AcqRel);
    }
}
