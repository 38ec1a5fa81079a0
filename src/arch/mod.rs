//! # Architecture Abstraction Layer
//!
//! The one deliberately low-level building block of the crate: switching
//! between two stacks. Every port exports the same contract:
//!
//! - `SWITCH_FRAME_SIZE`: size of the initial frame built by
//!   `prepare_stack`: what `switch_stack` pushes, plus any padding the
//!   entry alignment needs.
//! - `STACK_ALIGN`: alignment the ABI requires of a stack top.
//! - `prepare_stack(top, entry) -> sp`: lay out a frame below `top` so that
//!   switching to `sp` "returns" into `entry`.
//! - `switch_stack(next_sp, save_sp)`: save callee-saved state on the current
//!   stack, store the stack pointer through `save_sp`, load `next_sp`,
//!   restore the state found there and return into that flow.
//! - `relax()` / `signal()`: busy-wait hint and its wake-up counterpart,
//!   used by the lock table.

#[cfg(all(target_arch = "x86_64", not(windows)))]
mod x86_64;
#[cfg(all(target_arch = "x86_64", not(windows)))]
pub use self::x86_64::*;

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use self::aarch64::*;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use self::cortex_m4::*;

#[cfg(not(any(
    all(target_arch = "x86_64", not(windows)),
    target_arch = "aarch64",
    all(target_arch = "arm", target_os = "none"),
)))]
compile_error!("taskman has no context-switch port for this target");

/// Signature of the function a fresh stack returns into.
pub type EntryTrampoline = extern "C" fn() -> !;
