//! Generic trap handling over the arch-level stubs: interrupt-disable
//! guards, IRQ handler registration, the kernel page-fault path, and
//! the deferred-reschedule flag external handlers set.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::arch::idt::{TrapFrame, PAGE_FAULT_VECTOR};
use crate::arch::{irq, mm, pic, usercopy};
use crate::prelude::*;
use crate::sync::SpinLock;

/// What a page fault was doing, for whoever resolves it.
#[derive(Debug, Clone, Copy)]
pub struct PageFaultInfo {
    pub addr: Vaddr,
    /// The access was a write.
    pub write: bool,
    /// The page was present (a protection fault, not a missing page).
    pub present: bool,
    /// The fault came from ring 3.
    pub from_user: bool,
}

type PageFaultHandler = fn(&PageFaultInfo) -> bool;

static PAGE_FAULT_HANDLER: spin::Once<PageFaultHandler> = spin::Once::new();

/// Registers the resolver consulted for faults on user addresses (the
/// supplemental page table's loader). Returns true when the fault was
/// satisfied and the access should retry.
pub fn set_page_fault_handler(handler: PageFaultHandler) {
    PAGE_FAULT_HANDLER.call_once(|| handler);
}

struct IrqTable {
    handlers: [Option<Box<dyn Fn() + Send + Sync>>; 16],
}

static IRQ_TABLE: SpinLock<IrqTable> = SpinLock::new(IrqTable {
    handlers: [
        None, None, None, None, None, None, None, None, None, None, None, None, None, None, None,
        None,
    ],
});

/// Registers the callback for IRQ line `irq` (0..16). External handlers
/// run with interrupts disabled and must not sleep.
pub fn register_irq_handler<F>(irq_line: u8, handler: F)
where
    F: Fn() + Send + Sync + 'static,
{
    IRQ_TABLE.lock_irq_disabled().handlers[irq_line as usize] = Some(Box::new(handler));
}

static IRQ_NESTING: AtomicUsize = AtomicUsize::new(0);
static YIELD_ON_RETURN: AtomicBool = AtomicBool::new(false);

/// Whether the CPU is currently inside an external interrupt handler.
pub fn in_interrupt() -> bool {
    IRQ_NESTING.load(Ordering::Relaxed) > 0
}

/// Asks for a reschedule once the current trap unwinds; the only
/// scheduling action an external handler may take.
pub fn set_yield_on_return() {
    YIELD_ON_RETURN.store(true, Ordering::Relaxed);
}

pub(crate) fn take_yield_on_return() -> bool {
    YIELD_ON_RETURN.swap(false, Ordering::Relaxed)
}

pub(crate) fn init() {
    // Nothing beyond what arch::init already set up; kept as an anchor
    // for the init ordering in lib.rs.
}

/// Dispatches the IRQ for `vector`: acknowledge, then the registered
/// callback.
pub(crate) fn dispatch_irq(vector: u32) {
    let line = (vector as u8) - pic::IRQ_BASE;
    IRQ_NESTING.fetch_add(1, Ordering::Relaxed);
    pic::end_of_interrupt(line);
    let table = IRQ_TABLE.lock();
    if let Some(handler) = table.handlers[line as usize].as_ref() {
        handler();
    }
    drop(table);
    IRQ_NESTING.fetch_sub(1, Ordering::Relaxed);
}

pub(crate) fn is_irq(vector: u32) -> bool {
    (pic::IRQ_BASE as u32..pic::IRQ_BASE as u32 + 16).contains(&vector)
}

/// The single entry every trap funnels into.
pub(crate) fn handle_trap(tf: &mut TrapFrame) {
    if tf.from_user() {
        // Unwinds to the `enter_user` caller; never returns here.
        crate::cpu::user_trap(tf);
    }

    if is_irq(tf.trap_num) {
        dispatch_irq(tf.trap_num);
        // A handler may have asked for a reschedule (timer slice
        // expiry, a wakeup of something with higher priority).
        crate::task::preempt_on_irq_return();
        return;
    }

    if tf.trap_num == PAGE_FAULT_VECTOR as u32 {
        let info = PageFaultInfo {
            addr: mm::read_cr2(),
            write: tf.error_code & 2 != 0,
            present: tf.error_code & 1 != 0,
            from_user: false,
        };
        // A kernel-mode fault below the kernel base is a user pointer
        // dereference: give the paging layer a chance to demand-load,
        // then fall back to the usercopy fixup.
        if info.addr < crate::config::KERNEL_OFFSET {
            if let Some(handler) = PAGE_FAULT_HANDLER.get() {
                if handler(&info) {
                    return;
                }
            }
            if usercopy::try_fixup(tf) {
                return;
            }
        }
        panic!(
            "kernel page fault at {:#x} (eip {:#x}, error {:#x})",
            info.addr, tf.eip, tf.error_code
        );
    }

    panic!(
        "unexpected trap {} in kernel mode (eip {:#x}, error {:#x})",
        tf.trap_num, tf.eip, tf.error_code
    );
}

/// Disable all IRQs on the current CPU (i.e., locally).
///
/// This function returns a guard object, which will automatically
/// enable local IRQs again when it is dropped. The function works
/// correctly even when it is called in a nested way: the IRQs are only
/// re-enabled when the most outer guard is dropped.
#[must_use]
pub fn disable_local() -> DisabledLocalIrqGuard {
    DisabledLocalIrqGuard::new()
}

/// A guard for disabled local IRQs.
pub struct DisabledLocalIrqGuard {
    was_enabled: bool,
}

impl !Send for DisabledLocalIrqGuard {}

impl DisabledLocalIrqGuard {
    fn new() -> Self {
        let was_enabled = irq::is_local_enabled();
        if was_enabled {
            irq::disable_local();
        }
        Self { was_enabled }
    }
}

impl Drop for DisabledLocalIrqGuard {
    fn drop(&mut self) {
        if self.was_enabled {
            unsafe { irq::enable_local() };
        }
    }
}
