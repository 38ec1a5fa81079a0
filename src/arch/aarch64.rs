//! # AArch64 Port
//!
//! AAPCS64 callee-saved state is `x19`–`x28`, the frame pointer `x29`, the
//! link register `x30` and the low halves of `v8`–`v15`. `switch_stack`
//! stores them as ten register pairs and returns through `x30`.

use core::arch::naked_asm;

use super::EntryTrampoline;

/// Ten 16-byte register pairs.
pub const SWITCH_FRAME_SIZE: usize = 0xa0;

/// `sp` must stay 16-byte aligned at all times.
pub const STACK_ALIGN: usize = 16;

/// Word index of the saved `x30` inside the frame.
const LINK_REGISTER_SLOT: usize = 0x58 / 8;

/// Build the initial frame below `top` and return the stack pointer to
/// hand to `switch_stack`.
///
/// # Safety
/// `top` must be `STACK_ALIGN`-aligned and the `SWITCH_FRAME_SIZE` bytes
/// below it must be writable and owned by the new stack.
pub unsafe fn prepare_stack(top: *mut u8, entry: EntryTrampoline) -> *mut u8 {
    debug_assert_eq!(top as usize % STACK_ALIGN, 0);

    let frame = top.sub(SWITCH_FRAME_SIZE) as *mut u64;
    for slot in 0..SWITCH_FRAME_SIZE / 8 {
        frame.add(slot).write(0);
    }
    frame.add(LINK_REGISTER_SLOT).write(entry as usize as u64);

    frame as *mut u8
}

/// Suspend the current flow and continue the one saved at `next_sp`.
///
/// # Safety
/// `next_sp` must come from `prepare_stack` or from a previous
/// `switch_stack` whose flow has not been continued since. `save_sp` must
/// be valid for a pointer-sized write.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_stack(next_sp: *mut u8, save_sp: *mut *mut u8) {
    naked_asm!(
        "sub sp, sp, #0xa0",
        "stp x19, x20, [sp, #0x00]",
        "stp x21, x22, [sp, #0x10]",
        "stp x23, x24, [sp, #0x20]",
        "stp x25, x26, [sp, #0x30]",
        "stp x27, x28, [sp, #0x40]",
        "stp x29, x30, [sp, #0x50]",
        "stp d8, d9, [sp, #0x60]",
        "stp d10, d11, [sp, #0x70]",
        "stp d12, d13, [sp, #0x80]",
        "stp d14, d15, [sp, #0x90]",
        "mov x2, sp",
        "str x2, [x1]",
        "mov sp, x0",
        "ldp x19, x20, [sp, #0x00]",
        "ldp x21, x22, [sp, #0x10]",
        "ldp x23, x24, [sp, #0x20]",
        "ldp x25, x26, [sp, #0x30]",
        "ldp x27, x28, [sp, #0x40]",
        "ldp x29, x30, [sp, #0x50]",
        "ldp d8, d9, [sp, #0x60]",
        "ldp d10, d11, [sp, #0x70]",
        "ldp d12, d13, [sp, #0x80]",
        "ldp d14, d15, [sp, #0x90]",
        "add sp, sp, #0xa0",
        "ret",
    );
}

/// Busy-wait hint.
#[inline]
pub fn relax() {
    core::hint::spin_loop();
}

/// Nothing to wake: spinning processors poll.
#[inline]
pub fn signal() {}
