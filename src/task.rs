//! # Task Control Block
//!
//! A task is an execution context plus the scheduling metadata the run loop
//! needs. The metadata lives in the context's private data region, so a
//! task is fully described by its context handle and nothing is stored
//! outside the memory carved for it.
//!
//! Metadata is only mutated under the scheduler lock, either by the run
//! loop or by the task itself from `scheduler::wait`.

use core::fmt;
use core::mem::size_of;
use core::ptr::{self, NonNull};

use crate::config::MIN_CALL_RESERVE;
use crate::context::{self, Context, MIN_CONTEXT_SIZE};
use crate::handler::{WaitArg, WaitHandler};

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Observable state of a task.
///
/// ```text
///   ┌──────────┐    resume     ┌─────────┐   return_result   ┌──────────┐
///   │ Runnable │ ────────────► │ Running │ ────────────────► │ Complete │
///   └──────────┘               └─────────┘                   └──────────┘
///        ▲  ▲        yield        │   │
///        │  └─────────────────────┘   │ wait (blocked)
///        │                            ▼
///        │   poll_resume granted ┌──────────┐
///        └────────────────────── │ Blocked  │
///                                └──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible for the next scheduling pass.
    Runnable,
    /// Inside a `resume` call.
    Running,
    /// Waiting on the named handler.
    Blocked(&'static str),
    /// Returned a result; never resumed again.
    Complete(usize),
}

// ---------------------------------------------------------------------------
// Scheduling metadata
// ---------------------------------------------------------------------------

/// What a blocked task waits for.
#[derive(Clone, Copy)]
pub(crate) struct Waiting {
    pub(crate) handler: &'static dyn WaitHandler,
    pub(crate) arg: WaitArg,
}

const TASK_MAGIC: u32 = 0x7A5C_3A11;
const STACK_CANARY: usize = 0x5AFE_57AC;

/// Stored right after the context header. `canary` is the highest word of
/// the metadata, so it borders the low end of the task's stack and is the
/// first thing an overflowing stack overwrites.
#[repr(C)]
struct TaskData {
    magic: u32,
    running: bool,
    waiting: Option<Waiting>,
    canary: usize,
}

/// Smallest stack a task can be spawned with: a minimal context, the
/// scheduling metadata in its private region and [`MIN_CALL_RESERVE`]
/// bytes of usable stack.
pub const MIN_TASK_STACK: usize = MIN_CONTEXT_SIZE + size_of::<TaskData>() + MIN_CALL_RESERVE;

// ---------------------------------------------------------------------------
// Task handle
// ---------------------------------------------------------------------------

/// Handle to a spawned task; the base of the memory carved for it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Task {
    context: Context,
}

impl Task {
    /// Attach fresh scheduling metadata (not waiting, not running) to a
    /// newly initialized context.
    ///
    /// # Safety
    /// `context` must be suspended and its private region must have room
    /// for the metadata.
    pub(crate) unsafe fn install(context: Context) -> Task {
        context.data().cast::<TaskData>().as_ptr().write(TaskData {
            magic: TASK_MAGIC,
            running: false,
            waiting: None,
            canary: STACK_CANARY,
        });
        Task { context }
    }

    /// The task whose context is running on this processor.
    ///
    /// # Panics
    /// Outside any context, or inside a context no scheduler spawned.
    pub fn current() -> Task {
        let task = Task {
            context: context::current(),
        };
        // SAFETY: `MIN_CONTEXT_SIZE` leaves at least one aligned word between
        // the header and the initial frame, which covers the magic field.
        let magic = unsafe { ptr::addr_of!((*task.data().as_ptr()).magic).read() };
        assert!(magic == TASK_MAGIC, "the active context is not a scheduler task");
        task
    }

    pub fn context(self) -> Context {
        self.context
    }

    /// Result of the task, once it has returned.
    pub fn result(self) -> Option<usize> {
        self.context.completed()
    }

    pub fn is_complete(self) -> bool {
        self.context.is_complete()
    }

    /// Snapshot of the task's scheduling state.
    pub fn state(self) -> TaskState {
        if let Some(result) = self.result() {
            return TaskState::Complete(result);
        }
        // SAFETY: metadata was written by `install`.
        let data = unsafe { &*self.data().as_ptr() };
        match (data.running, data.waiting) {
            (true, _) => TaskState::Running,
            (false, Some(waiting)) => TaskState::Blocked(waiting.handler.name()),
            (false, None) => TaskState::Runnable,
        }
    }

    /// Panic if the task's stack has grown into its metadata.
    ///
    /// # Panics
    /// If the stack canary was overwritten.
    pub(crate) fn check_stack(self) {
        // SAFETY: metadata was written by `install`; the canary is only
        // read, and the task is suspended.
        let canary = unsafe { ptr::addr_of!((*self.data().as_ptr()).canary).read_volatile() };
        assert!(
            canary == STACK_CANARY,
            "task at {:?} overflowed its stack",
            self.context.data()
        );
    }

    // -----------------------------------------------------------------------
    // Metadata access (scheduler lock held)
    // -----------------------------------------------------------------------

    fn data(self) -> NonNull<TaskData> {
        self.context.data().cast()
    }

    pub(crate) fn is_running(self) -> bool {
        // SAFETY: metadata was written by `install`.
        unsafe { (*self.data().as_ptr()).running }
    }

    pub(crate) fn set_running(self, running: bool) {
        // SAFETY: metadata was written by `install`; the lock serializes
        // writers.
        unsafe { (*self.data().as_ptr()).running = running }
    }

    pub(crate) fn waiting(self) -> Option<Waiting> {
        // SAFETY: as above.
        unsafe { (*self.data().as_ptr()).waiting }
    }

    pub(crate) fn set_waiting(self, waiting: Option<Waiting>) {
        // SAFETY: as above.
        unsafe { (*self.data().as_ptr()).waiting = waiting }
    }

    /// Readiness check of the run loop: not complete, not running, and
    /// either not waiting or granted by its handler. A ready task is marked
    /// running before this returns.
    pub(crate) fn claim_if_ready(self) -> bool {
        if self.is_complete() || self.is_running() {
            return false;
        }
        let ready = match self.waiting() {
            None => true,
            Some(waiting) => waiting.handler.poll_resume(self, waiting.arg).is_granted(),
        };
        if ready {
            self.set_running(true);
        }
        ready
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("at", &self.context.data())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::handler::Outcome;
    use core::sync::atomic::{AtomicBool, Ordering};

    struct Gate {
        open: AtomicBool,
    }

    impl WaitHandler for Gate {
        fn name(&self) -> &'static str {
            "gate"
        }

        fn attempt(&self, _task: Task, _arg: WaitArg) -> Outcome {
            self.open.load(Ordering::Relaxed).into()
        }

        fn poll_resume(&self, task: Task, arg: WaitArg) -> Outcome {
            self.attempt(task, arg)
        }
    }

    static GATE: Gate = Gate {
        open: AtomicBool::new(false),
    };

    fn body() {
        context::return_with_result(5);
    }

    fn fresh_task() -> Task {
        let block = Box::leak(vec![0u8; 16 << 10].into_boxed_slice());
        let context = Context::new(block, body, 0);
        // SAFETY: fresh context with a 16 KiB block.
        unsafe { Task::install(context) }
    }

    #[test]
    fn test_fresh_task_is_runnable() {
        let task = fresh_task();
        assert_eq!(task.state(), TaskState::Runnable);
        assert!(!task.is_running());
        assert!(task.waiting().is_none());
    }

    #[test]
    fn test_claim_marks_running() {
        let task = fresh_task();
        assert!(task.claim_if_ready());
        assert_eq!(task.state(), TaskState::Running);
        assert!(!task.claim_if_ready());
        task.set_running(false);
        assert_eq!(task.state(), TaskState::Runnable);
    }

    #[test]
    fn test_blocked_until_handler_grants() {
        let task = fresh_task();
        task.set_waiting(Some(Waiting {
            handler: &GATE,
            arg: WaitArg::NONE,
        }));
        assert_eq!(task.state(), TaskState::Blocked("gate"));
        assert!(!task.claim_if_ready());

        GATE.open.store(true, Ordering::Relaxed);
        assert!(task.claim_if_ready());
        assert_eq!(task.state(), TaskState::Running);
    }

    #[test]
    fn test_intact_stack_passes_check() {
        let task = fresh_task();
        task.check_stack();
        task.context().resume();
        task.check_stack();
    }

    #[test]
    #[should_panic(expected = "overflowed its stack")]
    fn test_overwritten_canary_is_detected() {
        let task = fresh_task();
        // SAFETY: the task is suspended; this simulates a stack running into
        // its metadata.
        unsafe { ptr::addr_of_mut!((*task.data().as_ptr()).canary).write(0) };
        task.check_stack();
    }

    #[test]
    fn test_completed_task_is_never_ready() {
        let task = fresh_task();
        task.context().resume();
        assert_eq!(task.state(), TaskState::Complete(5));
        assert_eq!(task.result(), Some(5));
        assert!(!task.claim_if_ready());
    }
}
