use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use log::info;
use spin::Mutex;

use crate::{BlockDevice, Sid, SECTOR_SIZE};

/// The role a partition plays for the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PartitionRole {
    /// Holds the kernel image; never written.
    Kernel,
    /// The file system proper.
    Filesys,
    /// Scratch space for the test harness.
    Scratch,
    /// Page-sized swap slots.
    Swap,
    /// The write-ahead log ring.
    Wal,
}

/// A contiguous sector range of an underlying device, numbered from zero.
#[derive(Clone)]
pub struct Partition {
    device: Arc<dyn BlockDevice>,
    start: Sid,
    len: Sid,
}

impl Partition {
    /// Creates a partition covering `[start, start + len)` of `device`.
    ///
    /// # Panics
    ///
    /// Panics if the range does not fit inside the device.
    pub fn new(device: Arc<dyn BlockDevice>, start: Sid, len: Sid) -> Self {
        assert!(start.checked_add(len).is_some());
        assert!(start + len <= device.sector_count());
        Self { device, start, len }
    }

    /// The first sector of the partition on the underlying device.
    pub fn start(&self) -> Sid {
        self.start
    }
}

impl BlockDevice for Partition {
    fn sector_count(&self) -> Sid {
        self.len
    }

    fn read_sector(&self, sid: Sid, buf: &mut [u8; SECTOR_SIZE]) {
        assert!(sid < self.len, "sector {} out of partition range", sid);
        self.device.read_sector(self.start + sid, buf);
    }

    fn write_sector(&self, sid: Sid, buf: &[u8; SECTOR_SIZE]) {
        assert!(sid < self.len, "sector {} out of partition range", sid);
        self.device.write_sector(self.start + sid, buf);
    }
}

static PARTITIONS: Mutex<BTreeMap<PartitionRole, Partition>> = Mutex::new(BTreeMap::new());

/// Registers the partition serving `role`. Called once per role during
/// disk bring-up, before any consumer asks for it.
pub fn register_partition(role: PartitionRole, partition: Partition) {
    info!(
        "partition {:?}: start {}, {} sectors",
        role,
        partition.start,
        partition.len
    );
    PARTITIONS.lock().insert(role, partition);
}

/// Looks up the partition serving `role`.
pub fn lookup_partition(role: PartitionRole) -> Option<Partition> {
    PARTITIONS.lock().get(&role).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemDisk;

    #[test]
    fn independent_numbering() {
        let disk = Arc::new(MemDisk::new(64));
        let a = Partition::new(disk.clone(), 0, 32);
        let b = Partition::new(disk.clone(), 32, 32);

        let mut buf = [0u8; SECTOR_SIZE];
        buf[0] = 0xAA;
        a.write_sector(3, &buf);
        buf[0] = 0xBB;
        b.write_sector(3, &buf);

        let mut readback = [0u8; SECTOR_SIZE];
        a.read_sector(3, &mut readback);
        assert_eq!(readback[0], 0xAA);
        disk.read_sector(35, &mut readback);
        assert_eq!(readback[0], 0xBB);
    }

    #[test]
    #[should_panic]
    fn out_of_range_write() {
        let disk = Arc::new(MemDisk::new(8));
        let p = Partition::new(disk, 0, 4);
        p.write_sector(4, &[0u8; SECTOR_SIZE]);
    }
}
