//! # Kernel
//!
//! The process-wide scheduler and the free-function API most programs use.
//! Programs that need several schedulers or other capacities build their
//! own [`Scheduler`] instead.
//!
//! ## Startup Sequence
//!
//! ```text
//! main()
//!   ├─► semaphore::register(kernel::scheduler())  ← handlers (×N)
//!   ├─► kernel::spawn()                           ← tasks (×N)
//!   └─► kernel::run()                             ← until kernel::stop()
//!         └─► pass: maintain handlers, resume ready tasks
//! ```
//!
//! Every processor that should execute tasks calls `run`; they share the
//! same registry.

use crate::context::EntryFn;
use crate::handler::WaitHandler;
use crate::scheduler::{Scheduler, Stats};
use crate::task::Task;

pub use crate::scheduler::{return_result, wait, yield_task};

static SCHEDULER: Scheduler = Scheduler::new();

/// The global scheduler.
pub fn scheduler() -> &'static Scheduler {
    &SCHEDULER
}

/// Spawn a task on the global scheduler.
///
/// # Panics
/// If the stack is too small, the arena is exhausted or the task registry
/// is full.
pub fn spawn(entry: EntryFn, argument: usize, stack_size: usize) -> Task {
    SCHEDULER.spawn(entry, argument, stack_size)
}

/// # Panics
/// If the handler registry is full.
pub fn register_handler(handler: &'static dyn WaitHandler) {
    SCHEDULER.register_handler(handler);
}

/// Run the global scheduler on this processor until [`stop`] is called.
pub fn run() {
    SCHEDULER.run_loop();
}

pub fn stop() {
    SCHEDULER.stop();
}

pub fn stats() -> Stats {
    SCHEDULER.stats()
}
