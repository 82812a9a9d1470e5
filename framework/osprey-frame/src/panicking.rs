//! Panic handling: print, walk the frame pointers, halt the machine.

use core::panic::PanicInfo;

use crate::arch::qemu::{exit_qemu, QemuExitCode};

#[panic_handler]
fn panic_handler(info: &PanicInfo) -> ! {
    // Interrupts stay off for good; the machine is going down.
    crate::arch::irq::disable_local();
    crate::println!("kernel panic: {}", info);
    print_stack_trace();
    exit_qemu(QemuExitCode::Failed);
}

/// Walks the saved EBP chain. Frame pointers are kept (the build forces
/// them), so each frame is `[saved ebp, return address]`.
fn print_stack_trace() {
    crate::println!("stack trace:");
    let mut ebp: usize;
    unsafe {
        core::arch::asm!("mov {}, ebp", out(reg) ebp);
    }
    for depth in 0..16 {
        if ebp == 0 || ebp % core::mem::size_of::<usize>() != 0 {
            break;
        }
        let frame = ebp as *const usize;
        let (next_ebp, ret) = unsafe { (*frame, *frame.add(1)) };
        crate::println!("  #{:02} ra {:#010x}", depth, ret);
        if next_ebp <= ebp {
            break;
        }
        ebp = next_ebp;
    }
}
