//! The buffer cache.
//!
//! A fixed set of 64 sector buffers over the file-system partition.
//! Lookup and placement go through a short directory mutex; each slot's
//! contents sit behind a reader-writer lock, so concurrent readers of
//! one sector are admitted together and a writer excludes them. Victim
//! selection is the second-chance clock over per-slot reference bits;
//! slots busy with an in-flight install are skipped.
//!
//! At any instant at most one slot holds a given sector. A dirty slot
//! holds committed content whose log records precede it (see the `wal`
//! module), so eviction and the periodic flush write it home directly.
//!
//! Mutations enter through a [`Txn`]: `write_tx` stages the new bytes in
//! the transaction, capturing the sector's current content as the before
//! image on first touch, and only `Txn::commit` publishes them here.

use crate::os::{Condvar, Mutex, RwMutex};
use crate::prelude::*;
use crate::wal::{Txn, Wal};

/// The number of sector buffers in the cache.
pub(crate) const CACHE_SLOTS: usize = 64;

/// Bound on the read-ahead queue; overflow is silently dropped.
const READAHEAD_QUEUE_MAX: usize = 16;

/// How often the background writeback runs, in milliseconds.
pub(crate) const FLUSH_INTERVAL_MS: u64 = 30_000;

struct SlotState {
    sector: Option<Sid>,
    dirty: bool,
    data: Box<[u8; SECTOR_SIZE]>,
}

struct Slot {
    state: RwMutex<SlotState>,
}

struct CacheDir {
    map: BTreeMap<Sid, usize>,
    owner: [Option<Sid>; CACHE_SLOTS],
    refbit: [bool; CACHE_SLOTS],
    busy: [bool; CACHE_SLOTS],
    hand: usize,
}

/// The sector cache over the file-system partition.
pub struct BufferCache {
    device: Partition,
    wal: Arc<Wal>,
    slots: Vec<Slot>,
    dir: Mutex<CacheDir>,
    readahead: Mutex<VecDeque<Sid>>,
    readahead_avail: Condvar,
}

impl BufferCache {
    pub fn new(device: Partition, wal: Arc<Wal>) -> Arc<Self> {
        let mut slots = Vec::with_capacity(CACHE_SLOTS);
        for _ in 0..CACHE_SLOTS {
            slots.push(Slot {
                state: RwMutex::new(SlotState {
                    sector: None,
                    dirty: false,
                    data: Box::new([0u8; SECTOR_SIZE]),
                }),
            });
        }
        Arc::new(BufferCache {
            device,
            wal,
            slots,
            dir: Mutex::new(CacheDir {
                map: BTreeMap::new(),
                owner: [None; CACHE_SLOTS],
                refbit: [false; CACHE_SLOTS],
                busy: [false; CACHE_SLOTS],
                hand: 0,
            }),
            readahead: Mutex::new(VecDeque::new()),
            readahead_avail: Condvar::new(),
        })
    }

    pub(crate) fn wal(&self) -> &Arc<Wal> {
        &self.wal
    }

    /// Opens a transaction whose writes will be staged against this cache.
    pub fn begin_tx(self: &Arc<Self>) -> Txn {
        Txn::new(self.wal.begin(), self.wal.clone(), self.clone())
    }

    /// Reads `buf.len()` bytes of `sector` starting at `offset`.
    pub fn read(&self, sector: Sid, offset: usize, buf: &mut [u8]) {
        assert!(offset + buf.len() <= SECTOR_SIZE);
        loop {
            let idx = self.ensure_slot(sector);
            let state = self.slots[idx].state.read();
            if state.sector == Some(sector) {
                buf.copy_from_slice(&state.data[offset..offset + buf.len()]);
                return;
            }
            // The slot was repurposed between lookup and lock; retry.
        }
    }

    /// Reads `sector` respecting `txn`'s staged writes.
    pub fn read_tx(&self, txn: &Txn, sector: Sid, offset: usize, buf: &mut [u8]) {
        if let Some(idx) = txn.find(sector) {
            buf.copy_from_slice(&txn.writes[idx].after[offset..offset + buf.len()]);
            return;
        }
        self.read(sector, offset, buf);
    }

    /// Stages a write of `data` at `offset` of `sector` into `txn`.
    pub fn write_tx(&self, txn: &mut Txn, sector: Sid, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= SECTOR_SIZE);
        let idx = self.stage_into(txn, sector);
        txn.writes[idx].after[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Stages zeroing the whole of `sector` into `txn`.
    pub fn zero_tx(&self, txn: &mut Txn, sector: Sid) {
        let idx = self.stage_into(txn, sector);
        txn.writes[idx].after.fill(0);
    }

    fn stage_into(&self, txn: &mut Txn, sector: Sid) -> usize {
        if let Some(idx) = txn.find(sector) {
            return idx;
        }
        let mut before = [0u8; SECTOR_SIZE];
        self.read(sector, 0, &mut before);
        txn.stage(sector, &before)
    }

    /// Installs a committed after image, leaving the slot dirty. Called
    /// by the log once the commit record is durable.
    pub(crate) fn apply_committed(&self, sector: Sid, data: &[u8; SECTOR_SIZE]) {
        loop {
            let idx = self.ensure_slot(sector);
            let mut state = self.slots[idx].state.write();
            if state.sector == Some(sector) {
                *state.data = *data;
                state.dirty = true;
                return;
            }
        }
    }

    /// Writes every dirty slot home and clears its dirty bit.
    pub fn flush_all(&self) {
        for slot in self.slots.iter() {
            let mut state = slot.state.write();
            if state.dirty {
                let sector = state.sector.expect("dirty slot without a sector");
                self.device.write_sector(sector, &state.data);
                state.dirty = false;
            }
        }
    }

    /// Enqueues `sector` for the read-ahead worker. Duplicates and
    /// overflow are dropped.
    pub fn prefetch(&self, sector: Sid) {
        let mut queue = self.readahead.lock();
        if queue.len() < READAHEAD_QUEUE_MAX && !queue.contains(&sector) {
            queue.push_back(sector);
            self.readahead_avail.notify_one();
        }
    }

    /// The body of the read-ahead worker thread.
    pub(crate) fn readahead_loop(&self) {
        loop {
            let sector = {
                let mut queue = self.readahead.lock();
                loop {
                    if let Some(sector) = queue.pop_front() {
                        break sector;
                    }
                    queue = self.readahead_avail.wait(queue);
                }
            };
            trace!("bcache: read-ahead of sector {}", sector);
            self.ensure_slot(sector);
        }
    }

    /// Returns the index of a slot holding `sector`, installing it on a
    /// miss. The caller must re-check the slot's sector after locking
    /// its state: a concurrent eviction may have repurposed it.
    fn ensure_slot(&self, sector: Sid) -> usize {
        loop {
            let mut dir = self.dir.lock();
            if let Some(&idx) = dir.map.get(&sector) {
                dir.refbit[idx] = true;
                return idx;
            }

            let Some(idx) = Self::pick_victim(&mut dir) else {
                // Every slot is mid-install; let them finish.
                drop(dir);
                continue;
            };
            dir.busy[idx] = true;
            if let Some(old) = dir.owner[idx] {
                dir.map.remove(&old);
            }
            dir.map.insert(sector, idx);
            dir.owner[idx] = Some(sector);
            dir.refbit[idx] = true;
            drop(dir);

            {
                let mut state = self.slots[idx].state.write();
                if state.dirty {
                    let old = state.sector.expect("dirty slot without a sector");
                    self.device.write_sector(old, &state.data);
                    state.dirty = false;
                }
                self.device.read_sector(sector, &mut state.data);
                state.sector = Some(sector);
            }

            self.dir.lock().busy[idx] = false;
            return idx;
        }
    }

    /// The second-chance clock sweep.
    fn pick_victim(dir: &mut CacheDir) -> Option<usize> {
        for _ in 0..2 * CACHE_SLOTS {
            let hand = dir.hand;
            dir.hand = (dir.hand + 1) % CACHE_SLOTS;
            if dir.busy[hand] {
                continue;
            }
            if dir.refbit[hand] {
                dir.refbit[hand] = false;
                continue;
            }
            return Some(hand);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use osprey_block::MemDisk;

    fn setup(sectors: Sid) -> (Arc<MemDisk>, Arc<BufferCache>) {
        let disk = Arc::new(MemDisk::new(sectors + 64));
        let home = Partition::new(disk.clone(), 0, sectors);
        let wal_part = Partition::new(disk.clone(), sectors, 64);
        Wal::format(&wal_part);
        let wal = Wal::open(wal_part);
        (disk, BufferCache::new(home, wal))
    }

    #[test]
    fn committed_write_read_back() {
        let (_disk, cache) = setup(256);
        let mut txn = cache.begin_tx();
        cache.write_tx(&mut txn, 5, 100, b"hello");
        txn.commit().unwrap();

        let mut buf = [0u8; 5];
        cache.read(5, 100, &mut buf);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn uncommitted_writes_stay_invisible() {
        let (_disk, cache) = setup(256);
        {
            let mut txn = cache.begin_tx();
            cache.write_tx(&mut txn, 9, 0, b"doomed");
            // Dropped without commit: aborted.
        }
        let mut buf = [0u8; 6];
        cache.read(9, 0, &mut buf);
        assert_eq!(buf, [0u8; 6]);
    }

    #[test]
    fn read_your_own_writes() {
        let (_disk, cache) = setup(256);
        let mut txn = cache.begin_tx();
        cache.write_tx(&mut txn, 3, 0, b"abc");
        let mut buf = [0u8; 3];
        cache.read_tx(&txn, 3, 0, &mut buf);
        assert_eq!(&buf, b"abc");
        txn.commit().unwrap();
    }

    #[test]
    fn survives_eviction_pressure() {
        let (_disk, cache) = setup(512);
        // Touch three times the cache's capacity in distinct sectors.
        for sector in 0..(3 * CACHE_SLOTS as Sid) {
            let mut txn = cache.begin_tx();
            cache.write_tx(&mut txn, sector, 0, &sector.to_le_bytes());
            txn.commit().unwrap();
        }
        for sector in 0..(3 * CACHE_SLOTS as Sid) {
            let mut buf = [0u8; 4];
            cache.read(sector, 0, &mut buf);
            assert_eq!(buf, sector.to_le_bytes());
        }
    }

    #[test]
    fn flush_writes_home() {
        let (disk, cache) = setup(256);
        let mut txn = cache.begin_tx();
        cache.write_tx(&mut txn, 17, 0, b"durable");
        txn.commit().unwrap();
        cache.flush_all();

        let mut sector = [0u8; SECTOR_SIZE];
        disk.read_sector(17, &mut sector);
        assert_eq!(&sector[..7], b"durable");
    }

    #[test]
    fn coalesces_per_sector() {
        let (_disk, cache) = setup(256);
        let mut txn = cache.begin_tx();
        cache.write_tx(&mut txn, 2, 0, b"first");
        cache.write_tx(&mut txn, 2, 0, b"again");
        assert_eq!(txn.writes.len(), 1);
        txn.commit().unwrap();

        let mut buf = [0u8; 5];
        cache.read(2, 0, &mut buf);
        assert_eq!(&buf, b"again");
    }
}
