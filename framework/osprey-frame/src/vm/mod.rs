//! Virtual and physical memory: the frame pools, the kernel heap, page
//! directories, and checked copies across the user boundary.

mod frame_allocator;
pub(crate) mod heap_allocator;
mod page_table;

pub type Vaddr = usize;
pub type Paddr = usize;

pub use crate::arch::mm::{paddr_to_vaddr, PageTableFlags};
pub use frame_allocator::{alloc_frame, alloc_zeroed_frame, user_pool_stats, Pool, VmFrame};
pub use page_table::{activate_boot_directory, PageDirectory};

use crate::arch::usercopy;
use crate::config::KERNEL_OFFSET;
use crate::prelude::*;

pub(crate) fn init() {
    frame_allocator::init(crate::boot::regions());
    page_table::init();
}

fn user_range_ok(addr: Vaddr, len: usize) -> bool {
    addr.checked_add(len).is_some_and(|end| end <= KERNEL_OFFSET)
}

/// Copies `dst.len()` bytes from user memory at `src`. Fails, without
/// harming the kernel, on any fault the paging layer cannot resolve.
pub fn copy_from_user(dst: &mut [u8], src: Vaddr) -> Result<()> {
    if !user_range_ok(src, dst.len()) {
        return Err(crate::Error::PageFault);
    }
    unsafe { usercopy::copy_user_raw(dst.as_mut_ptr() as usize, src, dst.len()) }
        .map_err(|_| crate::Error::PageFault)
}

/// Copies `src` into user memory at `dst`.
pub fn copy_to_user(dst: Vaddr, src: &[u8]) -> Result<()> {
    if !user_range_ok(dst, src.len()) {
        return Err(crate::Error::PageFault);
    }
    unsafe { usercopy::copy_user_raw(dst, src.as_ptr() as usize, src.len()) }
        .map_err(|_| crate::Error::PageFault)
}
