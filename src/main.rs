//! # taskman Host Demo
//!
//! Two short programs run back to back on the host:
//!
//! | Part | Layer | Behavior |
//! |------|-------|----------|
//! | 1 | Contexts | One context yields three times, reading its argument and private data, then returns |
//! | 2 | Scheduler | A producer and two consumers share a bounded buffer guarded by two semaphores; consumers block in `down` until an item arrives, and a pass clock paces both sides |
//!
//! Set `RUST_LOG=debug` (or `trace`) to see the scheduler's own logging.

use std::sync::atomic::{AtomicUsize, Ordering};

use taskman::config::DEFAULT_STACK_SIZE;
use taskman::context::{self, Context};
use taskman::{kernel, semaphore, PassClock, Semaphore};

// ---------------------------------------------------------------------------
// Part 1: a bare context
// ---------------------------------------------------------------------------

const MAGIC_ARGUMENT: usize = 0xDEAD_BEEF;
const MAGIC_PRIVATE: u32 = 0xAAAA_BEEF;

fn counting_body() {
    let private = context::private_data(None).cast::<u32>();
    for round in 0..3 {
        // SAFETY: the driver wrote a u32 at the start of the private region.
        let marker = unsafe { private.as_ptr().read() };
        log::info!(
            "context round {round}: argument {:#x}, private data {marker:#x}",
            context::argument()
        );
        context::yield_now();
    }
    context::return_with_result(context::argument() ^ MAGIC_PRIVATE as usize);
}

fn part_one() {
    let block = Box::leak(vec![0u8; DEFAULT_STACK_SIZE].into_boxed_slice());
    let ctx = Context::new(block, counting_body, MAGIC_ARGUMENT);
    // SAFETY: the context's private region is 16-byte aligned and far larger
    // than a u32.
    unsafe { context::private_data(Some(ctx)).cast::<u32>().as_ptr().write(MAGIC_PRIVATE) };

    let mut resumes = 0;
    while ctx.completed().is_none() {
        ctx.resume();
        resumes += 1;
    }
    log::info!(
        "context completed after {resumes} resumes with {:#x}",
        ctx.completed().unwrap_or_default()
    );
}

// ---------------------------------------------------------------------------
// Part 2: scheduled tasks
// ---------------------------------------------------------------------------

const SLOTS: u32 = 2;
const ITEMS: usize = 8;
const CONSUMERS: usize = 2;

static FREE: Semaphore = Semaphore::new(SLOTS, SLOTS);
static FILLED: Semaphore = Semaphore::new(0, SLOTS);
static FINISHED: Semaphore = Semaphore::new(0, CONSUMERS as u32);
static CLOCK: PassClock = PassClock::new();

/// Items handed out so far. Indices from `ITEMS` on are end-of-work
/// markers, one per consumer.
static NEXT_ITEM: AtomicUsize = AtomicUsize::new(0);
static PRODUCED: AtomicUsize = AtomicUsize::new(0);
static CONSUMED: AtomicUsize = AtomicUsize::new(0);

fn producer() {
    for item in 0..ITEMS + CONSUMERS {
        FREE.down();
        if item < ITEMS {
            PRODUCED.fetch_add(1, Ordering::SeqCst);
            log::info!("produced item {item} at pass {}", CLOCK.now());
        }
        FILLED.up();
        CLOCK.sleep(1);
    }
    kernel::return_result(ITEMS);
}

fn consumer() {
    let name = context::argument();
    let mut taken = 0;
    loop {
        FILLED.down();
        let item = NEXT_ITEM.fetch_add(1, Ordering::SeqCst);
        FREE.up();
        if item >= ITEMS {
            break;
        }
        let total = CONSUMED.fetch_add(1, Ordering::SeqCst) + 1;
        taken += 1;
        log::info!("consumer {name} took item {item} ({total}/{ITEMS} consumed)");
        // Work on the item for a while so the other consumer gets the next.
        CLOCK.sleep(2);
    }
    log::info!("consumer {name} done after {taken} item(s)");
    FINISHED.up();
    kernel::return_result(taken);
}

fn supervisor() {
    for _ in 0..CONSUMERS {
        FINISHED.down();
    }
    log::info!(
        "all items handled: {} produced, {} consumed",
        PRODUCED.load(Ordering::SeqCst),
        CONSUMED.load(Ordering::SeqCst)
    );
    kernel::stop();
    kernel::return_result(0);
}

fn part_two() {
    semaphore::register(kernel::scheduler());
    kernel::register_handler(&CLOCK);

    kernel::spawn(supervisor, 0, DEFAULT_STACK_SIZE);
    let producer = kernel::spawn(producer, 0, DEFAULT_STACK_SIZE);
    let consumers = [
        kernel::spawn(consumer, 1, DEFAULT_STACK_SIZE),
        kernel::spawn(consumer, 2, DEFAULT_STACK_SIZE),
    ];

    kernel::run();

    log::info!("producer returned {:?}", producer.result());
    for (index, task) in consumers.iter().enumerate() {
        log::info!("consumer {} returned {:?}", index + 1, task.result());
    }
    log::info!("{:?}", kernel::stats());
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("part 1: execution context");
    part_one();

    log::info!("part 2: scheduler with semaphores on {}", taskman::cpu::current_id());
    part_two();
}
