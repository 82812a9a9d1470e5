//! Paging primitives: page table entry flags, control registers, TLB.

use bitflags::bitflags;

use crate::config::KERNEL_OFFSET;

bitflags! {
    /// Flags shared by 32-bit page-directory and page-table entries.
    pub struct PageTableFlags: u32 {
        const PRESENT       = 1 << 0;
        const WRITABLE      = 1 << 1;
        const USER          = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const NO_CACHE      = 1 << 4;
        const ACCESSED      = 1 << 5;
        const DIRTY         = 1 << 6;
        /// 4 MiB page (directory entries only).
        const HUGE          = 1 << 7;
        const GLOBAL        = 1 << 8;
    }
}

pub const ENTRIES_PER_TABLE: usize = 1024;

pub fn read_cr2() -> usize {
    unsafe { x86::controlregs::cr2() }
}

pub fn read_cr3() -> usize {
    unsafe { x86::controlregs::cr3() as usize }
}

/// # Safety
///
/// `paddr` must point at a valid page directory that maps the kernel.
pub unsafe fn write_cr3(paddr: usize) {
    x86::controlregs::cr3_write(paddr as u64);
}

pub fn flush_tlb_entry(vaddr: usize) {
    unsafe { x86::tlb::flush(vaddr) };
}

pub fn flush_tlb_all() {
    unsafe { x86::tlb::flush_all() };
}

/// Translates a physical address into the kernel's linear mapping.
pub const fn paddr_to_vaddr(paddr: usize) -> usize {
    paddr + KERNEL_OFFSET
}

/// Translates a kernel linear-map address back to physical.
pub const fn vaddr_to_paddr(vaddr: usize) -> usize {
    vaddr - KERNEL_OFFSET
}
