//! The user-mode register file and the kernel↔user crossing.
//!
//! `enter_user` saves the calling kernel thread's callee-saved state,
//! loads the user register file and irets into ring 3. The next trap
//! out of ring 3 copies the registers back into the same `UserContext`
//! and unwinds straight to `enter_user`'s caller. While a thread is in
//! user mode its kernel stack is empty, so the crossing state lives in
//! a single CPU-local cell.

use core::cell::UnsafeCell;

use crate::arch::context::{CalleeRegs, __enter_user, __leave_user};
use crate::arch::idt::{TrapFrame, PAGE_FAULT_VECTOR, SYSCALL_VECTOR};
use crate::arch::{irq, mm, segment};

/// The ring-3 register file, saved and restored across the crossing.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct UserContext {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub eip: u32,
    pub eflags: u32,
    /// Why the last crossing returned: trap vector.
    pub trap_num: u32,
    pub error_code: u32,
    /// CR2 at the time of a page fault.
    pub fault_addr: u32,
}

/// Why `enter_user` came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnReason {
    Syscall,
    Exception,
    Interrupt,
}

struct CrossingCell {
    kregs: UnsafeCell<CalleeRegs>,
    uctx: UnsafeCell<*mut UserContext>,
    reason: UnsafeCell<ReturnReason>,
}

// Single CPU; only touched with interrupts disabled.
unsafe impl Sync for CrossingCell {}

static CROSSING: CrossingCell = CrossingCell {
    kregs: UnsafeCell::new(CalleeRegs {
        esp: 0,
        ebx: 0,
        ebp: 0,
        esi: 0,
        edi: 0,
    }),
    uctx: UnsafeCell::new(core::ptr::null_mut()),
    reason: UnsafeCell::new(ReturnReason::Interrupt),
};

const EFLAGS_IF: u32 = 1 << 9;
const EFLAGS_RESERVED: u32 = 1 << 1;

/// Runs `ctx` in ring 3 until it traps. Interrupts are on in user mode
/// regardless of the caller's state; the caller's interrupt level is
/// restored on return.
pub fn enter_user(ctx: &mut UserContext) -> ReturnReason {
    let was_enabled = irq::is_local_enabled();
    irq::disable_local();

    ctx.eflags = (ctx.eflags | EFLAGS_IF | EFLAGS_RESERVED) & !(3 << 12); // IOPL 0
    unsafe {
        segment::set_kernel_stack(crate::task::current_kernel_stack_top());
        *CROSSING.uctx.get() = ctx as *mut _;
        __enter_user(CROSSING.kregs.get(), ctx);
        // `__leave_user` lands us back here.
        let reason = *CROSSING.reason.get();
        if was_enabled {
            irq::enable_local();
        }
        reason
    }
}

/// Called by the trap dispatcher for any trap out of ring 3. Copies the
/// frame into the current `UserContext` and unwinds to `enter_user`.
pub(crate) fn user_trap(tf: &mut TrapFrame) -> ! {
    let reason = if tf.trap_num == SYSCALL_VECTOR as u32 {
        ReturnReason::Syscall
    } else if crate::trap::is_irq(tf.trap_num) {
        // Acknowledge and run the handler before unwinding; the iret
        // frame on this stack is abandoned.
        crate::trap::dispatch_irq(tf.trap_num);
        ReturnReason::Interrupt
    } else {
        ReturnReason::Exception
    };

    unsafe {
        let ctx = &mut **CROSSING.uctx.get();
        ctx.eax = tf.eax;
        ctx.ebx = tf.ebx;
        ctx.ecx = tf.ecx;
        ctx.edx = tf.edx;
        ctx.esi = tf.esi;
        ctx.edi = tf.edi;
        ctx.ebp = tf.ebp;
        ctx.esp = tf.esp;
        ctx.eip = tf.eip;
        ctx.eflags = tf.eflags;
        ctx.trap_num = tf.trap_num;
        ctx.error_code = tf.error_code;
        ctx.fault_addr = if tf.trap_num == PAGE_FAULT_VECTOR as u32 {
            mm::read_cr2() as u32
        } else {
            0
        };
        *CROSSING.reason.get() = reason;
        __leave_user(CROSSING.kregs.get())
    }
}
