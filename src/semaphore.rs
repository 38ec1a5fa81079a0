//! # Counting Semaphore
//!
//! A counter bounded by `[0, max]`, built purely on the wait-handler
//! protocol. `down` takes a unit when the count is positive, `up` returns
//! one when the count is below `max`; either blocks the calling task
//! through `scheduler::wait` until its operation fits.
//!
//! The semaphore never yields or touches scheduler state itself. All
//! semaphores share one stateless handler; the request a task waits with
//! names the semaphore and the operation.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::handler::{Outcome, WaitArg, WaitHandler};
use crate::scheduler::{self, Scheduler};
use crate::task::Task;

/// Bounded counting semaphore.
#[derive(Debug)]
pub struct Semaphore {
    count: AtomicU32,
    max: u32,
}

impl Semaphore {
    /// # Panics
    /// If `initial > max`.
    pub const fn new(initial: u32, max: u32) -> Self {
        assert!(initial <= max, "semaphore initial count exceeds its maximum");
        Semaphore {
            count: AtomicU32::new(initial),
            max,
        }
    }

    /// Take one unit, blocking the calling task while the count is zero.
    ///
    /// # Panics
    /// Outside a scheduler task.
    pub fn down(&self) {
        self.wait_for(Op::Down);
    }

    /// Return one unit, blocking the calling task while the count is at
    /// its maximum.
    ///
    /// # Panics
    /// Outside a scheduler task.
    pub fn up(&self) {
        self.wait_for(Op::Up);
    }

    /// Take one unit if the count is positive.
    pub fn try_down(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1))
            .is_ok()
    }

    /// Return one unit if the count is below the maximum.
    pub fn try_up(&self) -> bool {
        let max = self.max;
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < max).then_some(count + 1)
            })
            .is_ok()
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    fn wait_for(&self, op: Op) {
        let request = Request {
            semaphore: self,
            op,
        };
        scheduler::wait(Some(&HANDLER), WaitArg::new(&request));
    }
}

// ---------------------------------------------------------------------------
// Wait handler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Down,
    Up,
}

struct Request<'a> {
    semaphore: &'a Semaphore,
    op: Op,
}

impl Request<'_> {
    fn apply(&self) -> Outcome {
        match self.op {
            Op::Down => self.semaphore.try_down(),
            Op::Up => self.semaphore.try_up(),
        }
        .into()
    }
}

struct SemaphoreHandler;

static HANDLER: SemaphoreHandler = SemaphoreHandler;

impl SemaphoreHandler {
    fn request<'a>(arg: WaitArg) -> &'a Request<'a> {
        // SAFETY: the handler is only waited on by `Semaphore::wait_for`,
        // whose request outlives the wait.
        unsafe { arg.get::<Request<'a>>() }
    }
}

impl WaitHandler for SemaphoreHandler {
    fn name(&self) -> &'static str {
        "semaphore"
    }

    fn attempt(&self, _task: Task, arg: WaitArg) -> Outcome {
        Self::request(arg).apply()
    }

    fn poll_resume(&self, _task: Task, arg: WaitArg) -> Outcome {
        Self::request(arg).apply()
    }
}

/// The handler shared by every semaphore.
pub fn handler() -> &'static dyn WaitHandler {
    &HANDLER
}

/// Register the semaphore handler with `scheduler`.
pub fn register<const A: usize, const T: usize, const H: usize>(scheduler: &Scheduler<A, T, H>) {
    scheduler.register_handler(handler());
}

#[cfg(test)]
mod tests {
    use super::*;

    use core::sync::atomic::AtomicBool;

    use proptest::prelude::*;

    use crate::config::DEFAULT_STACK_SIZE;
    use crate::context;
    use crate::scheduler::{return_result, yield_task};
    use crate::task::TaskState;

    #[test]
    fn test_bounds() {
        let sem = Semaphore::new(1, 2);
        assert!(sem.try_up());
        assert_eq!(sem.count(), 2);
        assert!(!sem.try_up());
        assert_eq!(sem.count(), 2);
        assert!(sem.try_down());
        assert!(sem.try_down());
        assert!(!sem.try_down());
        assert_eq!(sem.count(), 0);
        assert_eq!(sem.max(), 2);
    }

    #[test]
    #[should_panic(expected = "exceeds its maximum")]
    fn test_initial_above_max() {
        let _ = Semaphore::new(3, 2);
    }

    #[test]
    fn test_failed_attempt_has_no_effect() {
        let sem = Semaphore::new(0, 1);
        let down = Request {
            semaphore: &sem,
            op: Op::Down,
        };
        assert_eq!(down.apply(), Outcome::Blocked);
        assert_eq!(sem.count(), 0);

        let up = Request {
            semaphore: &sem,
            op: Op::Up,
        };
        assert_eq!(up.apply(), Outcome::Granted);
        assert_eq!(up.apply(), Outcome::Blocked);
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn test_handler_identity() {
        assert_eq!(handler().name(), "semaphore");
    }

    #[test]
    #[should_panic(expected = "no context is active")]
    fn test_down_outside_task() {
        Semaphore::new(1, 1).down();
    }

    // -----------------------------------------------------------------------
    // Through the scheduler
    // -----------------------------------------------------------------------

    static MUTEX: Semaphore = Semaphore::new(0, 1);
    static GRANTS: AtomicU32 = AtomicU32::new(0);

    fn takes_mutex() {
        MUTEX.down();
        GRANTS.fetch_add(1, Ordering::SeqCst);
        return_result(context::argument());
    }

    fn releases_twice() {
        MUTEX.up();
        yield_task();
        MUTEX.up();
        return_result(0);
    }

    #[test]
    fn test_one_up_wakes_one_down() {
        static SCHED: Scheduler<{ 64 << 10 }, 4, 1> = Scheduler::new();
        register(&SCHED);

        let first = SCHED.spawn(takes_mutex, 1, DEFAULT_STACK_SIZE);
        let second = SCHED.spawn(takes_mutex, 2, DEFAULT_STACK_SIZE);
        for _ in 0..3 {
            SCHED.run_pass();
        }
        assert_eq!(first.state(), TaskState::Blocked("semaphore"));
        assert_eq!(second.state(), TaskState::Blocked("semaphore"));
        assert_eq!(GRANTS.load(Ordering::SeqCst), 0);

        let releaser = SCHED.spawn(releases_twice, 0, DEFAULT_STACK_SIZE);
        SCHED.run_pass(); // releaser ups once and yields
        assert_eq!(MUTEX.count(), 1);

        SCHED.run_pass(); // first takes it, second stays blocked, releaser ups again
        assert_eq!(first.result(), Some(1));
        assert_eq!(second.state(), TaskState::Blocked("semaphore"));
        assert_eq!(releaser.result(), Some(0));
        assert_eq!(GRANTS.load(Ordering::SeqCst), 1);

        SCHED.run_pass();
        assert_eq!(second.result(), Some(2));
        assert_eq!(GRANTS.load(Ordering::SeqCst), 2);
        assert_eq!(MUTEX.count(), 0);
    }

    static FULL: Semaphore = Semaphore::new(1, 1);

    fn ups_full() {
        FULL.up();
        return_result(1);
    }

    fn downs_full() {
        FULL.down();
        return_result(2);
    }

    #[test]
    fn test_up_blocks_at_max() {
        static SCHED: Scheduler<{ 64 << 10 }, 2, 1> = Scheduler::new();

        let upper = SCHED.spawn(ups_full, 0, DEFAULT_STACK_SIZE);
        SCHED.run_pass();
        assert_eq!(upper.state(), TaskState::Blocked("semaphore"));

        let downer = SCHED.spawn(downs_full, 0, DEFAULT_STACK_SIZE);
        SCHED.run_pass(); // upper still blocked when polled; downer takes the unit
        assert_eq!(downer.result(), Some(2));
        assert_eq!(FULL.count(), 0);

        SCHED.run_pass();
        assert_eq!(upper.result(), Some(1));
        assert_eq!(FULL.count(), 1);
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Down,
        Up,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![Just(Step::Down), Just(Step::Up)]
    }

    proptest! {
        #[test]
        fn prop_count_stays_in_bounds(
            initial in 0u32..4,
            extra in 0u32..4,
            steps in proptest::collection::vec(step(), 0..64),
        ) {
            let max = initial + extra;
            let sem = Semaphore::new(initial, max);
            let mut model = initial;
            for step in steps {
                let before = sem.count();
                let granted = match step {
                    Step::Down => sem.try_down(),
                    Step::Up => sem.try_up(),
                };
                match (step, granted) {
                    (Step::Down, true) => model -= 1,
                    (Step::Up, true) => model += 1,
                    (_, false) => prop_assert_eq!(sem.count(), before),
                }
                prop_assert_eq!(sem.count(), model);
                prop_assert!(sem.count() <= max);
            }
        }
    }

    /// Work for one scripted task: the semaphore, the task's steps and a
    /// flag raised if any task ever observes the count out of bounds.
    struct Script {
        semaphore: &'static Semaphore,
        steps: Vec<Step>,
        violated: &'static AtomicBool,
    }

    fn run_script() {
        // SAFETY: the property leaks every script it spawns.
        let script = unsafe { &*(context::argument() as *const Script) };
        for step in &script.steps {
            match step {
                Step::Down => script.semaphore.down(),
                Step::Up => script.semaphore.up(),
            }
            if script.semaphore.count() > script.semaphore.max() {
                script.violated.store(true, Ordering::SeqCst);
            }
            yield_task();
        }
        return_result(script.steps.len());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_scheduled_tasks_keep_bounds(
            initial in 0u32..3,
            extra in 0u32..3,
            scripts in proptest::collection::vec(
                proptest::collection::vec(step(), 0..12),
                1..5,
            ),
        ) {
            let max = initial + extra;
            let semaphore: &'static Semaphore = Box::leak(Box::new(Semaphore::new(initial, max)));
            let violated: &'static AtomicBool = Box::leak(Box::new(AtomicBool::new(false)));
            let sched: &'static Scheduler<{ 64 << 10 }, 4, 1> = Box::leak(Box::default());

            for steps in scripts.into_iter().take(4) {
                let script = Box::leak(Box::new(Script { semaphore, steps, violated }));
                sched.spawn(run_script, script as *const Script as usize, 16 << 10);
            }

            // Deadlocked scripts are fine; the bound must hold regardless.
            for _ in 0..64 {
                sched.run_pass();
                prop_assert!(semaphore.count() <= max);
            }
            prop_assert!(!violated.load(Ordering::SeqCst));
        }
    }
}
