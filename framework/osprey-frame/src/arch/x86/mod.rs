pub(crate) mod boot;
pub(crate) mod context;
pub mod idt;
pub mod irq;
pub mod mm;
pub(crate) mod pic;
mod pit;
pub mod qemu;
pub(crate) mod segment;
pub mod serial;
pub(crate) mod usercopy;

/// Brings up the CPU-side machinery: segments and the TSS, the trap
/// vectors, the interrupt controller, and the timer chip. Paging is
/// already on (the boot path turned it on before Rust ran).
pub(crate) fn init() {
    segment::init();
    idt::init();
    pic::init();
    pit::init();
}

/// Halts until the next interrupt; the idle loop lives on this.
pub fn halt() {
    unsafe { x86::halt() };
}
