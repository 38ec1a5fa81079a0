//! # x86-64 System V Port
//!
//! Callee-saved state under the System V ABI is `rbx`, `rbp`, `r12`–`r15`,
//! the MXCSR control bits and the x87 control word. `switch_stack` pushes
//! all of it, so a suspended flow is fully described by its stack pointer.
//!
//! ## Frame Layout (grows down, `sp` at the bottom)
//!
//! ```text
//! [top - 8]   0            fake return address of the trampoline
//! [top - 16]  entry        popped by `ret`
//! [sp + 48]   rbp
//! [sp + 40]   rbx
//! [sp + 32]   r12
//! [sp + 24]   r13
//! [sp + 16]   r14
//! [sp + 8]    r15
//! [sp + 0]    mxcsr (u32) | x87 control word (u16)
//! ```

use core::arch::naked_asm;

use super::EntryTrampoline;

/// Initial frame: control words, six registers, the return address and
/// the padding slot that keeps the trampoline's entry alignment.
pub const SWITCH_FRAME_SIZE: usize = 8 + 6 * 8 + 8 + 8;

/// The ABI requires `rsp + 8` to be 16-byte aligned on function entry.
pub const STACK_ALIGN: usize = 16;

/// Power-on MXCSR (all exceptions masked) and x87 control word (64-bit
/// precision, all exceptions masked).
const INITIAL_CONTROL_WORDS: u64 = 0x1F80 | (0x037F << 32);

/// Build the initial frame below `top` and return the stack pointer to
/// hand to `switch_stack`.
///
/// # Safety
/// `top` must be `STACK_ALIGN`-aligned and the `SWITCH_FRAME_SIZE`
/// bytes below it must be writable and owned by the new stack.
pub unsafe fn prepare_stack(top: *mut u8, entry: EntryTrampoline) -> *mut u8 {
    debug_assert_eq!(top as usize % STACK_ALIGN, 0);

    let frame = top.sub(SWITCH_FRAME_SIZE) as *mut u64;
    frame.write(INITIAL_CONTROL_WORDS);
    for slot in 1..7 {
        frame.add(slot).write(0); // r15, r14, r13, r12, rbx, rbp
    }
    frame.add(7).write(entry as usize as u64);
    frame.add(8).write(0);

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
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "sub rsp, 8",
        "stmxcsr [rsp]",
        "fnstcw [rsp + 4]",
        "mov [rsi], rsp",
        "mov rsp, rdi",
        "ldmxcsr [rsp]",
        "fldcw [rsp + 4]",
        "add rsp, 8",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
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
