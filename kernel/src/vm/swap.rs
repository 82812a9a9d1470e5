//! The swap-slot allocator over the SWAP partition.
//!
//! The partition is an array of page-sized slots with no header; a
//! bitmap tracks which are live. One mutex covers the allocator and
//! the transfers, so a swap-in cannot race the slot being reused.

use bitvec::prelude::*;
use osprey_block::{BlockDevice, Partition, SECTOR_SIZE};
use osprey_frame::vm::VmFrame;
use spin::Once;

use crate::prelude::*;

const SECTORS_PER_PAGE: usize = PAGE_SIZE / SECTOR_SIZE;

pub type SwapSlot = u32;

struct SwapManager {
    partition: Partition,
    used: BitVec,
}

static SWAP: Once<Mutex<SwapManager>> = Once::new();

pub(crate) fn init(partition: Partition) {
    let slots = partition.sector_count() as usize / SECTORS_PER_PAGE;
    info!("swap: {} slots", slots);
    SWAP.call_once(|| {
        Mutex::new(SwapManager {
            partition,
            used: bitvec![0; slots],
        })
    });
}

fn manager() -> &'static Mutex<SwapManager> {
    SWAP.get().expect("swap not initialized")
}

/// Copies `frame` out to a fresh slot.
pub fn swap_out(frame: &VmFrame) -> Result<SwapSlot> {
    let mut swap = manager().lock();
    let Some(slot) = swap.used.iter_zeros().next() else {
        return_errno_with_message!(Errno::ENOMEM, "out of swap slots");
    };
    swap.used.set(slot, true);
    let base = slot * SECTORS_PER_PAGE;
    let mut buf = [0u8; SECTOR_SIZE];
    for i in 0..SECTORS_PER_PAGE {
        frame.copy_to_slice(i * SECTOR_SIZE, &mut buf);
        swap.partition.write_sector((base + i) as u32, &buf);
    }
    Ok(slot as SwapSlot)
}

/// Fills `frame` from `slot` and releases the slot.
pub fn swap_in(slot: SwapSlot, frame: &VmFrame) {
    let mut swap = manager().lock();
    debug_assert!(swap.used[slot as usize], "swap-in from a free slot");
    let base = slot as usize * SECTORS_PER_PAGE;
    let mut buf = [0u8; SECTOR_SIZE];
    for i in 0..SECTORS_PER_PAGE {
        swap.partition.read_sector((base + i) as u32, &mut buf);
        frame.copy_from_slice(i * SECTOR_SIZE, &buf);
    }
    swap.used.set(slot as usize, false);
}

/// Releases a slot without reading it (the owner died).
pub fn free_slot(slot: SwapSlot) {
    manager().lock().used.set(slot as usize, false);
}
