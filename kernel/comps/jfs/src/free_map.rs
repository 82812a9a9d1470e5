//! The persistent sector allocator.
//!
//! One bit per file-system sector, kept in memory as a bit vector and
//! persisted in the free-map file whose inode lives at a fixed sector.
//! Allocations and releases are made under the caller's transaction, so
//! a crashed operation cannot leak or double-use sectors.

use bitvec::prelude::*;

use crate::bcache::BufferCache;
use crate::inode::{self, DiskInode};
use crate::prelude::*;
use crate::wal::Txn;

/// Bits tracked by one on-disk bitmap sector.
const BITS_PER_SECTOR: usize = SECTOR_SIZE * 8;

pub(crate) struct FreeMap {
    bits: BitVec<u8, Lsb0>,
    /// The data sectors of the free-map file, in order.
    store: Vec<Sid>,
}

impl FreeMap {
    /// Builds the initial map at format time: `reserved` sectors at the
    /// front of the partition (boot block, root and free-map inodes) are
    /// marked used, then the bitmap's own store is carved out right
    /// after them.
    pub(crate) fn create(sector_count: Sid, reserved: Sid) -> FreeMap {
        let mut bits = bitvec![u8, Lsb0; 0; sector_count as usize];
        for sid in 0..reserved {
            bits.set(sid as usize, true);
        }
        let store_len = (sector_count as usize).div_ceil(BITS_PER_SECTOR);
        assert!(store_len <= inode::DIRECT_COUNT, "file system too large");
        let mut store = Vec::with_capacity(store_len);
        for i in 0..store_len {
            let sid = reserved + i as Sid;
            bits.set(sid as usize, true);
            store.push(sid);
        }
        FreeMap { bits, store }
    }

    /// Loads the map from the free-map file at mount.
    pub(crate) fn load(cache: &BufferCache, inode_sector: Sid, sector_count: Sid) -> FreeMap {
        let disk_inode = DiskInode::read_from(cache, inode_sector);
        let store_len = (sector_count as usize).div_ceil(BITS_PER_SECTOR);
        let mut store = Vec::with_capacity(store_len);
        let mut raw = vec![0u8; store_len * SECTOR_SIZE];
        for i in 0..store_len {
            let sid = disk_inode.direct(i);
            assert!(sid != 0, "free-map file shorter than the partition needs");
            cache.read(sid, 0, &mut raw[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE]);
            store.push(sid);
        }
        let mut bits = BitVec::from_vec(raw);
        bits.truncate(sector_count as usize);
        FreeMap { bits, store }
    }

    /// The sectors backing the bitmap itself.
    pub(crate) fn store(&self) -> &[Sid] {
        &self.store
    }

    /// Allocates one sector, persisting the change under `txn`.
    pub(crate) fn allocate(&mut self, cache: &BufferCache, txn: &mut Txn) -> Result<Sid> {
        let Some(idx) = self.bits.iter_zeros().next() else {
            return_errno_with_message!(Errno::NoSpace, "no free sectors left");
        };
        self.bits.set(idx, true);
        self.persist_bit(cache, txn, idx);
        Ok(idx as Sid)
    }

    /// Returns a sector to the pool under `txn`.
    pub(crate) fn release(&mut self, cache: &BufferCache, txn: &mut Txn, sid: Sid) {
        debug_assert!(self.bits[sid as usize], "releasing a free sector");
        self.bits.set(sid as usize, false);
        self.persist_bit(cache, txn, sid as usize);
    }

    /// Writes the whole bitmap through the cache; used once at format.
    pub(crate) fn persist_all(&self, cache: &BufferCache, txn: &mut Txn) {
        for i in 0..self.store.len() {
            self.persist_bit(cache, txn, i * BITS_PER_SECTOR);
        }
    }

    /// Writes the bitmap sector containing `idx` through the cache.
    fn persist_bit(&self, cache: &BufferCache, txn: &mut Txn, idx: usize) {
        let sector_idx = idx / BITS_PER_SECTOR;
        let raw = self.bits.as_raw_slice();
        let start = sector_idx * SECTOR_SIZE;
        let end = (start + SECTOR_SIZE).min(raw.len());
        let mut buf = [0u8; SECTOR_SIZE];
        buf[..end - start].copy_from_slice(&raw[start..end]);
        cache.write_tx(txn, self.store[sector_idx], 0, &buf);
    }

    #[cfg(test)]
    pub(crate) fn is_used(&self, sid: Sid) -> bool {
        self.bits[sid as usize]
    }
}
