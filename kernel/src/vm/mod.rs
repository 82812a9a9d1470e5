//! Demand paging: the supplemental page table, the frame table with
//! clock eviction, swap, memory-mapped files, and the page-fault
//! policy (including stack growth).

pub mod frame_table;
pub mod mmap;
pub mod spt;
pub mod swap;

use align_ext::AlignExt;
use osprey_block::{lookup_partition, PartitionRole};
use osprey_frame::config::KERNEL_OFFSET;
use osprey_frame::trap::PageFaultInfo;

use crate::prelude::*;
use crate::process::Process;

/// The user stack tops out just under the kernel.
pub const USER_STACK_TOP: Vaddr = KERNEL_OFFSET;
/// How deep the stack may grow.
pub const USER_STACK_MAX: usize = 8 * 1024 * 1024;

pub fn init() {
    let swap_part = lookup_partition(PartitionRole::Swap).expect("no swap partition");
    swap::init(swap_part);
    osprey_frame::trap::set_page_fault_handler(kernel_fault_handler);
}

/// Resolves a fault at `addr` for `process`. `esp` is the user stack
/// pointer at the time of the trap, for the growth heuristic. Returns
/// false when the access is plainly bad and the process should die.
pub fn handle_fault(process: &Arc<Process>, addr: Vaddr, write: bool, esp: Vaddr) -> bool {
    if addr >= KERNEL_OFFSET {
        return false;
    }
    let upage = addr.align_down(PAGE_SIZE);
    let spt = process.spt();

    if spt.contains(upage) {
        if !spt.fault_is_loadable(upage, write) {
            return false;
        }
        return spt.load(process, upage).is_ok();
    }

    // Stack growth: within the stack region and at most a push's reach
    // below the live stack pointer.
    let stack_limit = USER_STACK_TOP - USER_STACK_MAX;
    if addr >= stack_limit && addr < USER_STACK_TOP && addr + 32 >= esp {
        if spt.install_zero(upage, true).is_err() {
            return false;
        }
        return spt.load(process, upage).is_ok();
    }
    false
}

/// The frame calls this for kernel-mode faults on user addresses (a
/// system call touching its caller's buffers).
fn kernel_fault_handler(info: &PageFaultInfo) -> bool {
    let Some(process) = crate::process::current() else {
        return false;
    };
    let esp = crate::thread::current_ctx()
        .and_then(|task| crate::thread::ctx_of(&task).map(|ctx| ctx.user_esp()))
        .unwrap_or(0);
    handle_fault(&process, info.addr, info.write, esp)
}
