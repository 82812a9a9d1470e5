use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::{BlockDevice, Sid, SECTOR_SIZE};

/// A RAM-backed disk.
///
/// The file-system tests run the whole storage stack against one of
/// these. `snapshot` clones the current sector contents, which is how
/// the crash-recovery tests model a power cut: everything written before
/// the snapshot is "on disk", everything after is lost.
pub struct MemDisk {
    sectors: Mutex<Vec<[u8; SECTOR_SIZE]>>,
}

impl MemDisk {
    /// Creates a zero-filled disk of `sector_count` sectors.
    pub fn new(sector_count: Sid) -> Self {
        Self {
            sectors: Mutex::new(vec![[0u8; SECTOR_SIZE]; sector_count as usize]),
        }
    }

    /// Clones the disk contents as they are at this instant.
    pub fn snapshot(&self) -> MemDisk {
        MemDisk {
            sectors: Mutex::new(self.sectors.lock().clone()),
        }
    }
}

impl BlockDevice for MemDisk {
    fn sector_count(&self) -> Sid {
        self.sectors.lock().len() as Sid
    }

    fn read_sector(&self, sid: Sid, buf: &mut [u8; SECTOR_SIZE]) {
        let sectors = self.sectors.lock();
        *buf = sectors[sid as usize];
    }

    fn write_sector(&self, sid: Sid, buf: &[u8; SECTOR_SIZE]) {
        let mut sectors = self.sectors.lock();
        sectors[sid as usize] = *buf;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_back_what_was_written() {
        let disk = MemDisk::new(16);
        let mut buf = [0u8; SECTOR_SIZE];
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = i as u8;
        }
        disk.write_sector(7, &buf);

        let mut readback = [0xFFu8; SECTOR_SIZE];
        disk.read_sector(7, &mut readback);
        assert_eq!(readback, buf);
    }

    #[test]
    fn snapshot_is_independent() {
        let disk = MemDisk::new(4);
        let mut buf = [1u8; SECTOR_SIZE];
        disk.write_sector(0, &buf);

        let frozen = disk.snapshot();
        buf[0] = 2;
        disk.write_sector(0, &buf);

        let mut readback = [0u8; SECTOR_SIZE];
        frozen.read_sector(0, &mut readback);
        assert_eq!(readback[0], 1);
    }
}
