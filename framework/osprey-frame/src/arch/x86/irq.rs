//! Low-level interrupt flag control.

/// Whether interrupts are enabled on this CPU.
pub fn is_local_enabled() -> bool {
    let eflags: u32;
    unsafe {
        core::arch::asm!("pushfd", "pop {}", out(reg) eflags, options(preserves_flags));
    }
    eflags & (1 << 9) != 0
}

pub fn disable_local() {
    unsafe { x86::irq::disable() };
}

/// # Safety
///
/// The caller must be prepared for interrupt handlers to run.
pub unsafe fn enable_local() {
    x86::irq::enable();
}
