//! # Execution Contexts
//!
//! A context is a suspendable flow of control living entirely inside a
//! caller-supplied memory block. This module never allocates; the caller
//! owns the block and may reuse it once the context is complete.
//!
//! ## Memory Layout
//!
//! ```text
//! low addresses                                             high addresses
//! ┌────────┬──────────────────────┬─────────────────────┬──────────────────┐
//! │ Header │ private data (caller │ free stack ....     │ initial frame    │
//! │        │ defined size)        │        <- grows down│ (arch port)      │
//! └────────┴──────────────────────┴─────────────────────┴──────────────────┘
//! ^ handle                                                                ^ top
//! ```
//!
//! ## Lifecycle
//!
//! `init` → {suspended → running → suspended}* via `resume` / `yield_now`
//! → complete, exactly once, via `return_with_result`. Resuming a complete
//! context does nothing.
//!
//! Only one context is active per processor. The active context is kept in
//! a per-processor marker, so this layer needs no lock of its own.

use core::fmt;
use core::mem::size_of;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch;

/// Body of a context. Recovers its argument through [`argument`].
pub type EntryFn = fn();

// ---------------------------------------------------------------------------
// Header and geometry
// ---------------------------------------------------------------------------

#[repr(C, align(16))]
struct Header {
    /// Saved stack pointer of the context while it is suspended.
    context_sp: *mut u8,
    /// Saved stack pointer of the resumer while the context runs.
    caller_sp: *mut u8,
    entry: EntryFn,
    argument: usize,
    result: usize,
    complete: AtomicBool,
}

/// Alignment of the header, the private data region and the stack top.
pub const CONTEXT_ALIGN: usize = 16;

/// Bytes taken by the fixed header. The private data region starts right
/// after it.
pub const HEADER_SIZE: usize = size_of::<Header>();

/// Register-save space the architecture port needs on a fresh stack.
pub const CONTEXT_RESERVE: usize = arch::SWITCH_FRAME_SIZE;

/// Smallest block `init` accepts, whatever the block's alignment.
pub const MIN_CONTEXT_SIZE: usize = HEADER_SIZE + CONTEXT_RESERVE + 2 * CONTEXT_ALIGN;

const _: () = assert!(CONTEXT_ALIGN % arch::STACK_ALIGN == 0);
const _: () = assert!(HEADER_SIZE % CONTEXT_ALIGN == 0);

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to an initialized execution context: the address of its header
/// inside the caller's block.
///
/// Handles are not `Send`; a context is resumed by the processor that holds
/// its handle.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Context(NonNull<Header>);

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("at", &self.0)
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl Context {
    /// Lay out a context over `size` bytes at `memory`.
    ///
    /// The first `resume` enters `entry`, which reads `argument` back with
    /// [`argument`].
    ///
    /// # Panics
    /// If `size` is below [`MIN_CONTEXT_SIZE`].
    ///
    /// # Safety
    /// The block must be valid for reads and writes for `size` bytes, must
    /// not be used for anything else while the context can still be
    /// resumed, and must outlive every use of the returned handle.
    pub unsafe fn init(memory: NonNull<u8>, size: usize, entry: EntryFn, argument: usize) -> Context {
        assert!(
            size >= MIN_CONTEXT_SIZE,
            "context block of {size} bytes is below the {MIN_CONTEXT_SIZE}-byte minimum"
        );

        let base = memory.as_ptr();
        let header = base.add(base.align_offset(CONTEXT_ALIGN)) as *mut Header;
        let end = base.add(size);
        let top = end.sub(end as usize % CONTEXT_ALIGN);

        let context_sp = arch::prepare_stack(top, context_entry);
        header.write(Header {
            context_sp,
            caller_sp: ptr::null_mut(),
            entry,
            argument,
            result: 0,
            complete: AtomicBool::new(false),
        });

        Context(NonNull::new_unchecked(header))
    }

    /// Lay out a context over a block the caller gives up for good.
    pub fn new(memory: &'static mut [u8], entry: EntryFn, argument: usize) -> Context {
        let size = memory.len();
        // SAFETY: the block is exclusively borrowed for 'static.
        unsafe { Context::init(NonNull::from(memory).cast(), size, entry, argument) }
    }

    /// Run the context until its next suspension point. Does nothing if it
    /// has completed.
    ///
    /// # Panics
    /// If called from inside a context: resumption does not nest.
    pub fn resume(self) {
        if let Some(active) = current_marker() {
            panic!("resume called from inside {active:?}: contexts do not nest");
        }
        if self.is_complete() {
            return;
        }

        let header = self.header();
        set_current_marker(Some(self));
        // SAFETY: the context is suspended (it is not active anywhere on this
        // processor and is not complete), so `context_sp` holds a valid frame.
        unsafe {
            arch::switch_stack((*header).context_sp, ptr::addr_of_mut!((*header).caller_sp));
        }
        set_current_marker(None);
    }

    /// The stored result, once the context has completed.
    pub fn completed(self) -> Option<usize> {
        let header = self.header();
        // SAFETY: the header outlives the handle.
        unsafe {
            if (*header).complete.load(Ordering::Acquire) {
                Some((*header).result)
            } else {
                None
            }
        }
    }

    pub fn is_complete(self) -> bool {
        self.completed().is_some()
    }

    /// Start of the private data region that follows the header.
    pub fn data(self) -> NonNull<u8> {
        // SAFETY: the region directly after the header is inside the block.
        unsafe { NonNull::new_unchecked(self.0.as_ptr().add(1) as *mut u8) }
    }

    fn header(self) -> *mut Header {
        self.0.as_ptr()
    }
}

// ---------------------------------------------------------------------------
// Operations on the active context
// ---------------------------------------------------------------------------

/// Handle of the context running on this processor.
///
/// # Panics
/// Outside any context.
pub fn current() -> Context {
    current_marker().unwrap_or_else(|| panic!("no context is active on this processor"))
}

/// Whether the caller runs inside a context.
pub fn in_context() -> bool {
    current_marker().is_some()
}

/// Suspend the active context and return to its resumer.
///
/// # Panics
/// Outside any context.
pub fn yield_now() {
    let header = current().header();
    // SAFETY: the active context was entered by `resume`, which stored the
    // resumer's stack pointer in `caller_sp`.
    unsafe {
        arch::switch_stack((*header).caller_sp, ptr::addr_of_mut!((*header).context_sp));
    }
}

/// Complete the active context with `value` and return to its resumer for
/// the last time.
///
/// # Panics
/// Outside any context.
pub fn return_with_result(value: usize) -> ! {
    let header = current().header();
    // SAFETY: only the context itself writes its result.
    unsafe {
        (*header).result = value;
        (*header).complete.store(true, Ordering::Release);
    }
    yield_now();
    unreachable!("a completed context was resumed");
}

/// Argument the active context was created with.
///
/// # Panics
/// Outside any context.
pub fn argument() -> usize {
    // SAFETY: the header outlives the active context.
    unsafe { (*current().header()).argument }
}

/// Private data region of `context`, or of the active context for `None`.
///
/// # Panics
/// For `None` outside any context.
pub fn private_data(context: Option<Context>) -> NonNull<u8> {
    context.unwrap_or_else(current).data()
}

extern "C" fn context_entry() -> ! {
    // SAFETY: `resume` marks the context active before switching here.
    let entry = unsafe { (*current().header()).entry };
    entry();
    return_with_result(0)
}

// ---------------------------------------------------------------------------
// Per-processor marker
// ---------------------------------------------------------------------------

#[cfg(feature = "std")]
std::thread_local! {
    static CURRENT: core::cell::Cell<Option<Context>> = const { core::cell::Cell::new(None) };
}

#[cfg(feature = "std")]
fn current_marker() -> Option<Context> {
    CURRENT.with(|current| current.get())
}

#[cfg(feature = "std")]
fn set_current_marker(context: Option<Context>) {
    CURRENT.with(|current| current.set(context));
}

#[cfg(not(feature = "std"))]
static CURRENT: [core::sync::atomic::AtomicPtr<Header>; crate::config::MAX_CORES] =
    [const { core::sync::atomic::AtomicPtr::new(ptr::null_mut()) }; crate::config::MAX_CORES];

#[cfg(not(feature = "std"))]
fn current_marker() -> Option<Context> {
    let slot = &CURRENT[crate::cpu::current_id().index()];
    NonNull::new(slot.load(Ordering::Relaxed)).map(Context)
}

#[cfg(not(feature = "std"))]
fn set_current_marker(context: Option<Context>) {
    let raw = context.map_or(ptr::null_mut(), |context| context.header());
    CURRENT[crate::cpu::current_id().index()].store(raw, Ordering::Relaxed);
}
