//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements the cooperative stack switch and the lock-table wait hints.
//!
//! ## Context Switch Mechanism
//!
//! Switching is an ordinary function call, not an exception: the caller has
//! already spilled everything the AAPCS lets a callee clobber, so only the
//! callee-saved registers need to travel with the stack:
//!
//! - **R4–R11** and **LR** on every build (R3 is pushed as padding so the
//!   frame keeps the 8-byte stack alignment the AAPCS requires)
//! - **S16–S31** on hard-float (`eabihf`) builds
//!
//! ## Stack Layout (top = high address, growing down)
//!
//! ```text
//! [Core registers]
//!   LR    (entry trampoline on a fresh stack)
//!   R11 .. R4
//!   R3    (padding)
//! [FPU registers, eabihf only]
//!   S31 .. S16                <- stack_pointer after init
//! ```

use core::arch::naked_asm;

use super::EntryTrampoline;

// ---------------------------------------------------------------------------
// Frame geometry
// ---------------------------------------------------------------------------

/// R3–R11 plus LR.
const CORE_FRAME_WORDS: usize = 10;

#[cfg(target_abi = "eabihf")]
const FPU_FRAME_WORDS: usize = 16;
#[cfg(not(target_abi = "eabihf"))]
const FPU_FRAME_WORDS: usize = 0;

/// Bytes pushed by `switch_stack`.
pub const SWITCH_FRAME_SIZE: usize = (CORE_FRAME_WORDS + FPU_FRAME_WORDS) * 4;

/// AAPCS public-interface stack alignment.
pub const STACK_ALIGN: usize = 8;

// ---------------------------------------------------------------------------
// Stack initialization
// ---------------------------------------------------------------------------

/// Initialize a stack frame for the first switch into a new context.
///
/// All saved registers start at zero; LR holds the trampoline so the
/// first `bx lr` in `switch_stack` enters it. Function pointers already
/// carry the Thumb bit.
///
/// # Safety
/// `top` must be `STACK_ALIGN`-aligned and the `SWITCH_FRAME_SIZE` bytes
/// below it must be writable and owned by the new stack.
pub unsafe fn prepare_stack(top: *mut u8, entry: EntryTrampoline) -> *mut u8 {
    let frame = top.sub(SWITCH_FRAME_SIZE) as *mut u32;
    for word in 0..SWITCH_FRAME_SIZE / 4 {
        frame.add(word).write(0);
    }
    frame
        .add(FPU_FRAME_WORDS + CORE_FRAME_WORDS - 1)
        .write(entry as usize as u32);

    frame as *mut u8
}

// ---------------------------------------------------------------------------
// Stack switch
// ---------------------------------------------------------------------------

/// Suspend the current flow and continue the one saved at `next_sp`.
///
/// ## Sequence
/// 1. Push R3–R11 and LR (and S16–S31 on hard-float) onto the current stack
/// 2. Store the resulting SP through `save_sp` (R1)
/// 3. Load `next_sp` (R0) into SP
/// 4. Pop the same registers and branch to the restored LR
///
/// # Safety
/// `next_sp` must come from `prepare_stack` or from a previous
/// `switch_stack` whose flow has not been continued since.
#[cfg(not(target_abi = "eabihf"))]
#[unsafe(naked)]
pub unsafe extern "C" fn switch_stack(next_sp: *mut u8, save_sp: *mut *mut u8) {
    naked_asm!(
        "push {{r3-r11, lr}}",
        "mov r2, sp",
        "str r2, [r1]",
        "mov sp, r0",
        "pop {{r3-r11, lr}}",
        "bx lr",
    );
}

/// Suspend the current flow and continue the one saved at `next_sp`.
///
/// # Safety
/// `next_sp` must come from `prepare_stack` or from a previous
/// `switch_stack` whose flow has not been continued since.
#[cfg(target_abi = "eabihf")]
#[unsafe(naked)]
pub unsafe extern "C" fn switch_stack(next_sp: *mut u8, save_sp: *mut *mut u8) {
    naked_asm!(
        "push {{r3-r11, lr}}",
        "vpush {{s16-s31}}",
        "mov r2, sp",
        "str r2, [r1]",
        "mov sp, r0",
        "vpop {{s16-s31}}",
        "pop {{r3-r11, lr}}",
        "bx lr",
    );
}

// ---------------------------------------------------------------------------
// Lock wait hints
// ---------------------------------------------------------------------------

/// Sleep until an event arrives (a `signal()` from a releasing core or any
/// exception entry).
#[inline]
pub fn relax() {
    cortex_m::asm::wfe();
}

/// Wake cores parked in `relax()`.
#[inline]
pub fn signal() {
    cortex_m::asm::sev();
}
