//! The Osprey kernel image: boot entry, disk bring-up, boot actions.
//!
//! The Multiboot shim in the frame jumps here with paging on and the
//! higher half live. Block drivers are outside the core, so boot
//! provides the block-device contract with a RAM disk and carves the
//! conventional partition roles out of it; a real driver would
//! register its partitions the same way.

#![no_std]
#![no_main]

extern crate alloc;

use alloc::sync::Arc;

use osprey_block::{register_partition, MemDisk, Partition, PartitionRole, Sid};
use osprey_frame::boot::KCmdlineArg;

// Sectors: 16 MiB of file system, 1 MiB of scratch, 4 MiB of swap and
// a 512 KiB log ring.
const FILESYS_SECTORS: Sid = 32 * 1024;
const SCRATCH_SECTORS: Sid = 2 * 1024;
const SWAP_SECTORS: Sid = 8 * 1024;
const WAL_SECTORS: Sid = 1024;

#[no_mangle]
pub extern "Rust" fn __osprey_main() -> ! {
    osprey_frame::init();
    let cmdline: KCmdlineArg = osprey_frame::boot::kcmdline();
    osprey_frame::println!("Osprey booting: {:?}", cmdline);

    setup_ram_disk();
    osprey_kernel::init(&cmdline);
    osprey_kernel::run_actions(&cmdline);

    // Nothing asked for a shutdown; sit idle, interrupts running.
    loop {
        osprey_frame::arch::halt();
    }
}

fn setup_ram_disk() {
    let total = FILESYS_SECTORS + SCRATCH_SECTORS + SWAP_SECTORS + WAL_SECTORS;
    let disk = Arc::new(MemDisk::new(total));

    let mut start = 0;
    let mut carve = |role: PartitionRole, len: Sid| {
        register_partition(role, Partition::new(disk.clone(), start, len));
        start += len;
    };
    carve(PartitionRole::Filesys, FILESYS_SECTORS);
    carve(PartitionRole::Scratch, SCRATCH_SECTORS);
    carve(PartitionRole::Swap, SWAP_SECTORS);
    carve(PartitionRole::Wal, WAL_SECTORS);
}
