//! The kernel heap: a buddy allocator over a static arena, rescued
//! with contiguous kernel-pool frames when it runs low.

use core::alloc::Layout;

use buddy_system_allocator::{Heap, LockedHeapWithRescue};

use crate::config::{KERNEL_HEAP_SIZE, PAGE_SIZE};
use crate::prelude::*;
use crate::vm::frame_allocator;

#[global_allocator]
static KERNEL_HEAP: LockedHeapWithRescue<32> = LockedHeapWithRescue::new(rescue);

static mut HEAP_SPACE: [u8; KERNEL_HEAP_SIZE] = [0; KERNEL_HEAP_SIZE];

pub(crate) fn init() {
    unsafe {
        KERNEL_HEAP
            .lock()
            .init(HEAP_SPACE.as_ptr() as usize, KERNEL_HEAP_SIZE);
    }
}

fn rescue(heap: &mut Heap<32>, layout: &Layout) {
    // Grow by at least the request, in 64-page bites.
    let pages = (layout.size().div_ceil(PAGE_SIZE)).max(64);
    let Some(paddr) = frame_allocator::alloc_kernel_contiguous(pages) else {
        error!("heap rescue failed: kernel pool exhausted");
        return;
    };
    let vaddr = crate::arch::mm::paddr_to_vaddr(paddr);
    unsafe {
        heap.add_to_heap(vaddr, vaddr + pages * PAGE_SIZE);
    }
}
