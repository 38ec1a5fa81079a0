//! # Taskman Configuration
//!
//! Compile-time constants governing the scheduler and the lock table.
//! All limits are fixed at compile time; nothing is allocated dynamically.

/// Maximum number of wait handlers a scheduler can register.
pub const MAX_HANDLERS: usize = 32;

/// Maximum number of tasks a scheduler can spawn. Task slots are never
/// reclaimed, so this bounds the total number of `spawn` calls.
pub const MAX_TASKS: usize = 128;

/// Size in bytes of the arena that task stacks are carved from.
/// Every task consumes exactly the stack size it was spawned with.
pub const ARENA_SIZE: usize = 256 << 10;

/// Number of slots in the global lock table.
pub const NUM_LOCKS: usize = 16;

/// Lock slot guarding every scheduler's shared state.
pub const SCHEDULER_LOCK_ID: usize = 2;

/// Number of processors sharing the statically indexed per-processor
/// state. Only consulted without the `std` feature; with `std`, each
/// thread acts as its own processor.
pub const MAX_CORES: usize = 1;

/// Stack size the demo and most tests hand to `spawn`. Large enough
/// for formatting and logging from inside a task on 64-bit hosts.
pub const DEFAULT_STACK_SIZE: usize = 16 << 10;

/// Stack every task keeps free below its initial frame for the deepest
/// path the crate itself takes on a task stack: the entry trampoline, the
/// task body's call into `wait` and the final `switch_stack`. Sized for
/// unoptimized builds.
pub const MIN_CALL_RESERVE: usize = 4 << 10;
