//! Running user code.
//!
//! A kernel thread that owns a [`UserContext`] drives its user body
//! with [`execute`]: the call returns only for events the kernel must
//! handle (a system call or an exception); interrupts are serviced and
//! folded into the loop, rescheduling when the timer asks for it.

pub use crate::cpu::{ReturnReason, UserContext};

/// Why `execute` handed control back to the kernel thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEvent {
    Syscall,
    Exception,
}

/// Runs `ctx` in user mode until it raises something only the caller
/// can deal with.
pub fn execute(ctx: &mut UserContext) -> UserEvent {
    loop {
        match crate::cpu::enter_user(ctx) {
            ReturnReason::Syscall => return UserEvent::Syscall,
            ReturnReason::Exception => return UserEvent::Exception,
            ReturnReason::Interrupt => {
                crate::task::preempt_on_irq_return();
            }
        }
    }
}
