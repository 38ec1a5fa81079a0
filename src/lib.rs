//! # taskman: Cooperative Stackful Task Manager
//!
//! Suspendable execution contexts with their own stacks, and a cooperative
//! scheduler that runs them over a shared registry from one or more
//! processors.
//!
//! ## Overview
//!
//! A **context** is a stack plus an entry function. Resuming it runs the
//! entry until it yields or returns a result, and control comes back to the
//! resumer. Contexts never nest: only a flow that is not itself inside a
//! context may resume one.
//!
//! A **task** is a context spawned on a scheduler. Tasks cooperate: they run
//! until they yield, wait on a synchronization handler or return. There is
//! no preemption.
//!
//! A **wait handler** is a class of synchronization resource (a semaphore,
//! a timer) that decides when a blocked task may continue. The scheduler
//! knows nothing about the resource beyond the handler protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │        spawn() · register_handler() · run() · stop()   │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │  Wait Handlers     │  Locks            │
//! │  scheduler.rs│  handler.rs        │  sync.rs          │
//! │  ─ run_pass()│  semaphore.rs      │  ─ acquire()      │
//! │  ─ wait()    │  clock.rs          │  ─ release()      │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │              Task Model (task.rs)                       │
//! │        TaskState · wait condition · running flag        │
//! ├────────────────────────────────────────────────────────┤
//! │              Contexts (context.rs, cpu.rs)              │
//! │     init · resume · yield · return · private data       │
//! ├────────────────────────────────────────────────────────┤
//! │       Arch Port (arch/x86_64, aarch64, cortex_m4)       │
//! │          Stack frame setup · naked stack switch         │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: contexts live in caller-provided blocks, tasks in the
//!   scheduler's inline arena
//! - **No reclamation**: arena space and registry slots of completed tasks
//!   are never reused
//! - **Task metadata** lives in each context's private data region
//! - **Shared state** is only touched under the scheduler lock
//!
//! ## Features
//!
//! - `std` (default): thread-local "current context" per processor, where
//!   every OS thread counts as a processor
//! - `demo`: the `taskman-demo` host binary
//!
//! Without `std` the crate is `no_std` and keeps one marker slot per
//! `config::MAX_CORES` processor.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod arch;
pub mod clock;
pub mod config;
pub mod context;
pub mod cpu;
pub mod error;
pub mod handler;
pub mod kernel;
pub mod scheduler;
pub mod semaphore;
pub mod sync;
pub mod task;

pub use clock::PassClock;
pub use context::Context;
pub use error::{LockError, RegisterError, SpawnError};
pub use handler::{Outcome, WaitArg, WaitHandler};
pub use scheduler::{Scheduler, Stats};
pub use semaphore::Semaphore;
pub use task::{Task, TaskState};
