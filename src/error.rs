//! Recoverable error types.
//!
//! Only lock misuse is meant to be handled by callers. Spawn and
//! registration errors surface through `try_spawn` / `try_register_handler`;
//! the plain `spawn` / `register_handler` treat them as fatal.

use thiserror::Error;

use crate::cpu::CpuId;

/// Lock-table misuse.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    #[error("lock id {0} is outside the lock table")]
    OutOfRange(usize),

    #[error("lock {id} is not held by {caller} (owner: {owner:?})")]
    NotOwner {
        id: usize,
        caller: CpuId,
        owner: Option<CpuId>,
    },
}

impl LockError {
    /// Numeric status for callers that follow the negative-return
    /// convention.
    pub const fn status(self) -> i32 {
        -1
    }
}

/// Why a task could not be spawned.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    #[error("stack of {requested} bytes is below the {minimum}-byte minimum")]
    StackTooSmall { requested: usize, minimum: usize },

    #[error("arena exhausted: {requested} bytes requested, {remaining} remaining")]
    ArenaExhausted { requested: usize, remaining: usize },

    #[error("task registry full ({capacity} tasks)")]
    TaskRegistryFull { capacity: usize },
}

/// Why a wait handler could not be registered.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    #[error("handler registry full ({capacity} handlers)")]
    HandlerRegistryFull { capacity: usize },
}
