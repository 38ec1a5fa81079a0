//! # Scheduler
//!
//! Cooperative run loop over a bounded pool of stackful tasks.
//!
//! ## Scheduling Algorithm
//!
//! Each pass of the run loop:
//! 1. **Maintain handlers**: under the lock, call `maintain` on every
//!    registered handler in registration order
//! 2. **Scan tasks** in spawn order. Under the lock, skip tasks that are
//!    complete or already running; a task with no wait condition is ready,
//!    a blocked task is ready when its handler's `poll_resume` grants
//! 3. **Resume** each ready task with the lock released, since the task may
//!    call back into `wait` or `spawn`; clear its running flag afterwards
//!
//! Tasks run until they yield, block in `wait` or return. There is no
//! preemption, no priority and no deadline: every runnable task gets one
//! resume opportunity per pass.
//!
//! ## Memory
//!
//! Stacks are carved from an arena owned by the scheduler at a monotonically
//! increasing offset and are never reclaimed, just like task slots.
//!
//! ## Processors
//!
//! Several processors may drive `run_loop` over one scheduler. A task's
//! running flag is set under the lock before the lock is released for the
//! resume, so one task is never resumed by two processors at once. A task
//! can continue on a different processor after each suspension point.

use core::cell::UnsafeCell;
use core::ptr::NonNull;

use crate::config::{ARENA_SIZE, MAX_HANDLERS, MAX_TASKS, SCHEDULER_LOCK_ID};
use crate::context::{self, Context, EntryFn, CONTEXT_ALIGN};
use crate::error::{RegisterError, SpawnError};
use crate::handler::{WaitArg, WaitHandler};
use crate::sync::Lock;
use crate::task::{Task, Waiting, MIN_TASK_STACK};

const LOCK: Lock = Lock::new(SCHEDULER_LOCK_ID);

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[repr(C, align(16))]
struct Arena<const N: usize> {
    bytes: UnsafeCell<[u8; N]>,
}

const _: () = assert!(CONTEXT_ALIGN <= 16);

struct State<const TASKS: usize, const HANDLERS: usize> {
    handlers: [Option<&'static dyn WaitHandler>; HANDLERS],
    handler_count: usize,
    tasks: [Option<Task>; TASKS],
    task_count: usize,
    arena_offset: usize,
    should_stop: bool,
}

impl<const TASKS: usize, const HANDLERS: usize> State<TASKS, HANDLERS> {
    fn handlers(&self) -> impl Iterator<Item = &'static dyn WaitHandler> + '_ {
        self.handlers[..self.handler_count].iter().flatten().copied()
    }

    fn live_tasks(&self) -> usize {
        self.tasks[..self.task_count]
            .iter()
            .flatten()
            .filter(|task| !task.is_complete())
            .count()
    }

    /// First task at or after `*cursor` that is ready, claimed for running.
    fn claim_next(&self, cursor: &mut usize) -> Option<Task> {
        while *cursor < self.task_count {
            let index = *cursor;
            *cursor += 1;
            if let Some(task) = self.tasks[index] {
                if task.claim_if_ready() {
                    return Some(task);
                }
            }
        }
        None
    }
}

/// Occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub tasks: usize,
    pub live_tasks: usize,
    pub handlers: usize,
    pub arena_used: usize,
    pub arena_size: usize,
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// Task registry, handler registry, stack arena and stop flag, protected by
/// the scheduler lock.
///
/// ## Design Notes
///
/// - Capacities are const parameters defaulting to `config`
/// - Spawning requires `&'static self`: tasks point into the arena, so the
///   scheduler must never move once it has tasks
pub struct Scheduler<
    const ARENA: usize = ARENA_SIZE,
    const TASKS: usize = MAX_TASKS,
    const HANDLERS: usize = MAX_HANDLERS,
> {
    state: UnsafeCell<State<TASKS, HANDLERS>>,
    arena: Arena<ARENA>,
}

// Safety: `state` is only accessed through `with_state`, which holds the
// scheduler lock. Arena bytes are owned by the task they were carved for.
unsafe impl<const A: usize, const T: usize, const H: usize> Sync for Scheduler<A, T, H> {}

impl<const ARENA: usize, const TASKS: usize, const HANDLERS: usize> Default
    for Scheduler<ARENA, TASKS, HANDLERS>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const ARENA: usize, const TASKS: usize, const HANDLERS: usize> Scheduler<ARENA, TASKS, HANDLERS> {
    /// An empty scheduler: no handlers, no tasks, the whole arena free.
    pub const fn new() -> Self {
        Self {
            state: UnsafeCell::new(State {
                handlers: [None; HANDLERS],
                handler_count: 0,
                tasks: [None; TASKS],
                task_count: 0,
                arena_offset: 0,
                should_stop: false,
            }),
            arena: Arena {
                bytes: UnsafeCell::new([0; ARENA]),
            },
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State<TASKS, HANDLERS>) -> R) -> R {
        let _guard = LOCK.lock();
        // SAFETY: the scheduler lock is held for the duration of `f`.
        f(unsafe { &mut *self.state.get() })
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Carve `stack_size` bytes from the arena and create a task that will
    /// run `entry` with `argument`.
    pub fn try_spawn(
        &'static self,
        entry: EntryFn,
        argument: usize,
        stack_size: usize,
    ) -> Result<Task, SpawnError> {
        if stack_size < MIN_TASK_STACK {
            return Err(SpawnError::StackTooSmall {
                requested: stack_size,
                minimum: MIN_TASK_STACK,
            });
        }

        self.with_state(|state| {
            let remaining = ARENA - state.arena_offset;
            if stack_size > remaining {
                return Err(SpawnError::ArenaExhausted {
                    requested: stack_size,
                    remaining,
                });
            }
            if state.task_count >= TASKS {
                return Err(SpawnError::TaskRegistryFull { capacity: TASKS });
            }

            // SAFETY: `arena_offset + stack_size <= ARENA`, and the range
            // was never handed out before.
            let task = unsafe {
                let base = (self.arena.bytes.get() as *mut u8).add(state.arena_offset);
                let context = Context::init(NonNull::new_unchecked(base), stack_size, entry, argument);
                Task::install(context)
            };
            state.arena_offset += stack_size;
            state.tasks[state.task_count] = Some(task);
            state.task_count += 1;

            log::debug!(
                "spawned task #{} ({} bytes, arena {}/{})",
                state.task_count - 1,
                stack_size,
                state.arena_offset,
                ARENA
            );
            Ok(task)
        })
    }

    /// [`try_spawn`](Self::try_spawn), treating every error as fatal.
    ///
    /// # Panics
    /// If the stack is too small, the arena is exhausted or the task
    /// registry is full.
    pub fn spawn(&'static self, entry: EntryFn, argument: usize, stack_size: usize) -> Task {
        self.try_spawn(entry, argument, stack_size)
            .unwrap_or_else(|err| panic!("spawn failed: {err}"))
    }

    /// Add `handler` to the handlers maintained on every pass.
    pub fn try_register_handler(&self, handler: &'static dyn WaitHandler) -> Result<(), RegisterError> {
        self.with_state(|state| {
            if state.handler_count >= HANDLERS {
                return Err(RegisterError::HandlerRegistryFull { capacity: HANDLERS });
            }
            state.handlers[state.handler_count] = Some(handler);
            state.handler_count += 1;
            log::debug!("registered wait handler {:?}", handler.name());
            Ok(())
        })
    }

    /// [`try_register_handler`](Self::try_register_handler), treating a full
    /// registry as fatal.
    pub fn register_handler(&self, handler: &'static dyn WaitHandler) {
        self.try_register_handler(handler)
            .unwrap_or_else(|err| panic!("register_handler failed: {err}"))
    }

    // -----------------------------------------------------------------------
    // Run loop
    // -----------------------------------------------------------------------

    /// One pass: maintain every handler, then give each ready task one
    /// resume. Returns how many tasks were resumed.
    ///
    /// # Panics
    /// If called from inside a task.
    pub fn run_pass(&self) -> usize {
        self.with_state(|state| {
            for handler in state.handlers() {
                handler.maintain();
            }
        });

        let mut cursor = 0;
        let mut resumed = 0;
        while let Some(task) = self.with_state(|state| state.claim_next(&mut cursor)) {
            log::trace!("resuming {task:?}");
            task.context().resume();
            task.check_stack();
            self.with_state(|_| task.set_running(false));
            resumed += 1;
        }

        log::trace!("pass resumed {resumed} task(s)");
        resumed
    }

    /// Run passes until [`stop`](Self::stop) is observed at the top of a
    /// pass.
    pub fn run_loop(&self) {
        while !self.is_stopped() {
            self.run_pass();
        }
        log::info!("run loop stopped");
    }

    /// Ask every run loop over this scheduler to exit after its current
    /// pass.
    pub fn stop(&self) {
        self.with_state(|state| state.should_stop = true);
        log::info!("scheduler stop requested");
    }

    pub fn is_stopped(&self) -> bool {
        self.with_state(|state| state.should_stop)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Handle of the `index`-th spawned task.
    pub fn task(&self, index: usize) -> Option<Task> {
        self.with_state(|state| state.tasks.get(index).copied().flatten())
    }

    /// Tasks that have not returned yet.
    pub fn live_tasks(&self) -> usize {
        self.with_state(|state| state.live_tasks())
    }

    pub fn stats(&self) -> Stats {
        self.with_state(|state| Stats {
            tasks: state.task_count,
            live_tasks: state.live_tasks(),
            handlers: state.handler_count,
            arena_used: state.arena_offset,
            arena_size: ARENA,
        })
    }
}

// ---------------------------------------------------------------------------
// Operations from inside a task
// ---------------------------------------------------------------------------

/// Block the calling task until `handler` grants the operation described by
/// `arg`, or for exactly one pass when `handler` is `None`.
///
/// A granted first attempt returns without yielding.
///
/// # Panics
/// Outside a scheduler task.
pub fn wait(handler: Option<&'static dyn WaitHandler>, arg: WaitArg) {
    let task = Task::current();

    let must_yield = {
        let _guard = LOCK.lock();
        let granted = handler.is_some_and(|handler| handler.attempt(task, arg).is_granted());
        if !granted {
            task.set_waiting(handler.map(|handler| Waiting { handler, arg }));
        }
        !granted
    };

    if must_yield {
        context::yield_now();
        let _guard = LOCK.lock();
        task.set_waiting(None);
    }
}

/// Suspend the calling task for one pass.
///
/// # Panics
/// Outside a scheduler task.
pub fn yield_task() {
    wait(None, WaitArg::NONE);
}

/// Complete the calling task with `value`.
///
/// # Panics
/// Outside any context.
pub fn return_result(value: usize) -> ! {
    context::return_with_result(value)
}
