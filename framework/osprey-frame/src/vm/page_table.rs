//! Per-process page directories.
//!
//! Two-level 32-bit paging. Every directory shares the kernel's upper
//! entries (cloned from the boot directory), so the kernel is mapped in
//! every address space; user mappings live strictly below
//! `KERNEL_OFFSET` and are installed page by page.

use alloc::collections::BTreeMap;

use spin::Once;

use crate::arch::mm::{
    self, flush_tlb_entry, paddr_to_vaddr, read_cr3, write_cr3, PageTableFlags, ENTRIES_PER_TABLE,
};
use crate::config::{KERNEL_OFFSET, PAGE_SIZE};
use crate::prelude::*;
use crate::sync::SpinLock;
use crate::vm::frame_allocator::{alloc_zeroed_frame, Pool, VmFrame};
use crate::vm::Paddr;

/// The kernel half of the boot page directory, shared by every space.
static KERNEL_PDES: Once<[u32; 256]> = Once::new();
static BOOT_PD_PADDR: Once<Paddr> = Once::new();

pub(crate) fn init() {
    let boot_pd = read_cr3() & !(PAGE_SIZE - 1);
    BOOT_PD_PADDR.call_once(|| boot_pd);
    KERNEL_PDES.call_once(|| {
        let mut entries = [0u32; 256];
        let pd = paddr_to_vaddr(boot_pd) as *const u32;
        for (i, entry) in entries.iter_mut().enumerate() {
            *entry = unsafe { *pd.add(768 + i) };
        }
        entries
    });
}

/// Drops back to the boot directory (kernel mappings only).
pub fn activate_boot_directory() {
    unsafe { write_cr3(*BOOT_PD_PADDR.get().expect("paging not initialized")) };
}

/// A user address space: one page-directory frame plus its page-table
/// frames, all from the kernel pool.
pub struct PageDirectory {
    dir: VmFrame,
    tables: SpinLock<BTreeMap<usize, VmFrame>>,
}

impl PageDirectory {
    pub fn new() -> Result<Self> {
        let dir = alloc_zeroed_frame(Pool::Kernel).ok_or(crate::Error::NoMemory)?;
        let pdes = KERNEL_PDES.get().expect("paging not initialized");
        let pd = dir.kaddr() as *mut u32;
        for (i, &entry) in pdes.iter().enumerate() {
            unsafe { *pd.add(768 + i) = entry };
        }
        Ok(PageDirectory {
            dir,
            tables: SpinLock::new(BTreeMap::new()),
        })
    }

    pub fn paddr(&self) -> Paddr {
        self.dir.paddr()
    }

    pub fn is_active(&self) -> bool {
        read_cr3() & !(PAGE_SIZE - 1) == self.dir.paddr()
    }

    /// Loads this directory into CR3.
    pub fn activate(&self) {
        unsafe { write_cr3(self.dir.paddr()) };
    }

    fn pde_slot(&self, vaddr: usize) -> *mut u32 {
        let pdi = vaddr >> 22;
        unsafe { (self.dir.kaddr() as *mut u32).add(pdi) }
    }

    fn pte_slot(&self, vaddr: usize) -> Option<*mut u32> {
        let pde = unsafe { *self.pde_slot(vaddr) };
        if pde & PageTableFlags::PRESENT.bits() == 0 {
            return None;
        }
        let pt = paddr_to_vaddr((pde as usize) & !(PAGE_SIZE - 1)) as *mut u32;
        let pti = (vaddr >> 12) & (ENTRIES_PER_TABLE - 1);
        Some(unsafe { pt.add(pti) })
    }

    /// Maps the user page at `vaddr` to the frame at `paddr`. The page
    /// must not already be mapped.
    pub fn map(&self, vaddr: usize, paddr: Paddr, writable: bool) -> Result<()> {
        assert!(vaddr < KERNEL_OFFSET, "mapping a kernel address");
        assert_eq!(vaddr % PAGE_SIZE, 0);

        let mut tables = self.tables.lock();
        let pde_slot = self.pde_slot(vaddr);
        if unsafe { *pde_slot } & PageTableFlags::PRESENT.bits() == 0 {
            let table = alloc_zeroed_frame(Pool::Kernel).ok_or(crate::Error::NoMemory)?;
            let pde = table.paddr() as u32
                | (PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER)
                    .bits();
            unsafe { *pde_slot = pde };
            tables.insert(vaddr >> 22, table);
        }
        drop(tables);

        let pte_slot = self.pte_slot(vaddr).unwrap();
        let old = unsafe { *pte_slot };
        assert!(
            old & PageTableFlags::PRESENT.bits() == 0,
            "page {:#x} is already mapped",
            vaddr
        );
        let mut flags = PageTableFlags::PRESENT | PageTableFlags::USER;
        if writable {
            flags |= PageTableFlags::WRITABLE;
        }
        unsafe { *pte_slot = paddr as u32 | flags.bits() };
        if self.is_active() {
            flush_tlb_entry(vaddr);
        }
        Ok(())
    }

    /// Removes the mapping at `vaddr`, returning the frame's physical
    /// address if one was mapped.
    pub fn unmap(&self, vaddr: usize) -> Option<Paddr> {
        let slot = self.pte_slot(vaddr)?;
        let pte = unsafe { *slot };
        if pte & PageTableFlags::PRESENT.bits() == 0 {
            return None;
        }
        unsafe { *slot = 0 };
        if self.is_active() {
            flush_tlb_entry(vaddr);
        }
        Some(pte as usize & !(PAGE_SIZE - 1))
    }

    /// The physical address `vaddr` maps to, if present.
    pub fn translate(&self, vaddr: usize) -> Option<Paddr> {
        let slot = self.pte_slot(vaddr & !(PAGE_SIZE - 1))?;
        let pte = unsafe { *slot };
        if pte & PageTableFlags::PRESENT.bits() == 0 {
            return None;
        }
        Some((pte as usize & !(PAGE_SIZE - 1)) + (vaddr & (PAGE_SIZE - 1)))
    }

    /// Reads and clears the hardware accessed bit of `vaddr`'s entry;
    /// the clock hand of eviction sweeps through this.
    pub fn test_and_clear_accessed(&self, vaddr: usize) -> bool {
        let Some(slot) = self.pte_slot(vaddr) else {
            return false;
        };
        let pte = unsafe { *slot };
        if pte & PageTableFlags::PRESENT.bits() == 0 {
            return false;
        }
        let accessed = pte & PageTableFlags::ACCESSED.bits() != 0;
        if accessed {
            unsafe { *slot = pte & !PageTableFlags::ACCESSED.bits() };
            if self.is_active() {
                flush_tlb_entry(vaddr);
            }
        }
        accessed
    }

    /// Whether the page at `vaddr` has been written since mapping.
    pub fn is_dirty(&self, vaddr: usize) -> bool {
        let Some(slot) = self.pte_slot(vaddr) else {
            return false;
        };
        let pte = unsafe { *slot };
        pte & PageTableFlags::PRESENT.bits() != 0 && pte & PageTableFlags::DIRTY.bits() != 0
    }
}

impl Drop for PageDirectory {
    fn drop(&mut self) {
        // Tearing down the active space would pull the rug out.
        assert!(!self.is_active(), "dropping the active page directory");
    }
}

impl Debug for PageDirectory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PageDirectory({:#x})", self.dir.paddr())
    }
}
