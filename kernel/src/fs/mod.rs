//! Mounting the file system and the console endpoints.

use osprey_block::{lookup_partition, register_partition, BlockDevice, Partition, PartitionRole};
use osprey_jfs::{Jfs, MountOptions};
use spin::Once;

use crate::prelude::*;

static JFS: Once<Arc<Jfs>> = Once::new();

/// Mounts (optionally formatting first). If the disk carries no
/// dedicated log partition, the tail eighth of FILESYS is carved off
/// for it and both roles are re-registered.
pub fn init(format: bool) {
    let filesys = lookup_partition(PartitionRole::Filesys).expect("no FILESYS partition");

    let (filesys, wal) = match lookup_partition(PartitionRole::Wal) {
        Some(wal) => (filesys, wal),
        None => {
            let total = filesys.sector_count();
            let wal_len = (total / 8).max(64);
            let backing: Arc<dyn BlockDevice> = Arc::new(filesys);
            let home = Partition::new(backing.clone(), 0, total - wal_len);
            let wal = Partition::new(backing, total - wal_len, wal_len);
            register_partition(PartitionRole::Filesys, home.clone());
            register_partition(PartitionRole::Wal, wal.clone());
            info!("fs: carved {} tail sectors for the log", wal_len);
            (home, wal)
        }
    };

    let jfs = Jfs::mount(
        filesys,
        wal,
        MountOptions {
            format,
            spawn_workers: true,
        },
    );
    JFS.call_once(|| jfs);
}

/// The mounted file system.
pub fn jfs() -> &'static Arc<Jfs> {
    JFS.get().expect("file system not mounted")
}

/// Flushes everything dirty ahead of power-off.
pub fn shutdown() {
    if let Some(jfs) = JFS.get() {
        jfs.flush();
    }
}

/// Console write, the backing of descriptor 1.
pub fn write_console(bytes: &[u8]) {
    osprey_frame::print!("{}", String::from_utf8_lossy(bytes));
}
