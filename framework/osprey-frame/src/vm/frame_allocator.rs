//! The physical page allocator.
//!
//! All usable RAM above the kernel image is split into two buddy pools:
//! the kernel pool feeds kernel stacks, page tables and heap rescue;
//! the user pool holds the frames user pages live in, so a runaway
//! user workload can exhaust its half without starving the kernel.

use core::sync::atomic::{AtomicUsize, Ordering};

use align_ext::AlignExt;
use buddy_system_allocator::FrameAllocator;
use spin::Once;

use crate::arch::mm::paddr_to_vaddr;
use crate::boot::MemoryRegion;
use crate::config::{PAGE_SIZE, PHYS_MAP_LIMIT};
use crate::prelude::*;
use crate::sync::SpinLock;
use crate::vm::Paddr;

/// Which pool a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Kernel,
    User,
}

static KERNEL_POOL: Once<SpinLock<FrameAllocator<32>>> = Once::new();
static USER_POOL: Once<SpinLock<FrameAllocator<32>>> = Once::new();

static USER_TOTAL: AtomicUsize = AtomicUsize::new(0);
static USER_IN_USE: AtomicUsize = AtomicUsize::new(0);

fn pool(which: Pool) -> &'static SpinLock<FrameAllocator<32>> {
    match which {
        Pool::Kernel => KERNEL_POOL.get().expect("frame pools not initialized"),
        Pool::User => USER_POOL.get().expect("frame pools not initialized"),
    }
}

/// One physical page, returned to its pool on drop.
pub struct VmFrame {
    paddr: Paddr,
    pool: Pool,
}

impl VmFrame {
    pub fn paddr(&self) -> Paddr {
        self.paddr
    }

    /// The frame's address in the kernel's linear mapping.
    pub fn kaddr(&self) -> usize {
        paddr_to_vaddr(self.paddr)
    }

    pub fn zero(&self) {
        unsafe {
            core::ptr::write_bytes(self.kaddr() as *mut u8, 0, PAGE_SIZE);
        }
    }

    /// Copies `data` into the frame at `offset`.
    pub fn copy_from_slice(&self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= PAGE_SIZE);
        unsafe {
            core::ptr::copy_nonoverlapping(
                data.as_ptr(),
                (self.kaddr() + offset) as *mut u8,
                data.len(),
            );
        }
    }

    /// Copies frame contents at `offset` out into `buf`.
    pub fn copy_to_slice(&self, offset: usize, buf: &mut [u8]) {
        assert!(offset + buf.len() <= PAGE_SIZE);
        unsafe {
            core::ptr::copy_nonoverlapping(
                (self.kaddr() + offset) as *const u8,
                buf.as_mut_ptr(),
                buf.len(),
            );
        }
    }

    /// Copies a whole page from another frame.
    pub fn copy_from_frame(&self, src: &VmFrame) {
        unsafe {
            core::ptr::copy_nonoverlapping(
                src.kaddr() as *const u8,
                self.kaddr() as *mut u8,
                PAGE_SIZE,
            );
        }
    }
}

impl Debug for VmFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "VmFrame({:#x}, {:?})", self.paddr, self.pool)
    }
}

impl Drop for VmFrame {
    fn drop(&mut self) {
        if self.pool == Pool::User {
            USER_IN_USE.fetch_sub(1, Ordering::Relaxed);
        }
        pool(self.pool).lock().dealloc(self.paddr / PAGE_SIZE, 1);
    }
}

/// Allocates one frame from `which`, or `None` when the pool is dry.
pub fn alloc_frame(which: Pool) -> Option<VmFrame> {
    let pfn = pool(which).lock().alloc(1)?;
    if which == Pool::User {
        USER_IN_USE.fetch_add(1, Ordering::Relaxed);
    }
    Some(VmFrame {
        paddr: pfn * PAGE_SIZE,
        pool: which,
    })
}

pub fn alloc_zeroed_frame(which: Pool) -> Option<VmFrame> {
    let frame = alloc_frame(which)?;
    frame.zero();
    Some(frame)
}

/// Allocates `count` physically contiguous kernel frames, leaking them
/// to the caller (the heap rescue path wants exactly that).
pub(crate) fn alloc_kernel_contiguous(count: usize) -> Option<Paddr> {
    let pfn = pool(Pool::Kernel).lock().alloc(count)?;
    Some(pfn * PAGE_SIZE)
}

/// (frames in use, pool size) of the user pool.
pub fn user_pool_stats() -> (usize, usize) {
    (
        USER_IN_USE.load(Ordering::Relaxed),
        USER_TOTAL.load(Ordering::Relaxed),
    )
}

pub(crate) fn init(regions: &[MemoryRegion]) {
    let image_end = crate::arch::boot::kernel_image_end().align_up(PAGE_SIZE);

    // Collect the usable page ranges above the image, clamped to the
    // linear-map window.
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    let mut total_pages = 0;
    for region in regions {
        let mut start = region.base.max(image_end);
        let mut end = region.base + region.len;
        end = end.min(PHYS_MAP_LIMIT);
        start = start.align_up(PAGE_SIZE);
        end = end.align_down(PAGE_SIZE);
        if start >= end {
            continue;
        }
        ranges.push((start / PAGE_SIZE, end / PAGE_SIZE));
        total_pages += (end - start) / PAGE_SIZE;
    }
    assert!(total_pages > 64, "not enough usable memory");

    // Half the free pages go to the user pool.
    let mut user_budget = total_pages / 2;
    let mut kernel = FrameAllocator::<32>::new();
    let mut user = FrameAllocator::<32>::new();
    let mut user_pages = 0;
    for (start, end) in ranges {
        let pages = end - start;
        if user_budget >= pages {
            user.add_frame(start, end);
            user_budget -= pages;
            user_pages += pages;
        } else if user_budget > 0 {
            user.add_frame(start, start + user_budget);
            kernel.add_frame(start + user_budget, end);
            user_pages += user_budget;
            user_budget = 0;
        } else {
            kernel.add_frame(start, end);
        }
    }
    USER_TOTAL.store(user_pages, Ordering::Relaxed);
    info!(
        "vm: {} pages total, {} in the user pool",
        total_pages, user_pages
    );

    KERNEL_POOL.call_once(|| SpinLock::new(kernel));
    USER_POOL.call_once(|| SpinLock::new(user));
}
