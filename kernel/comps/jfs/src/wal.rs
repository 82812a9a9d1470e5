//! The write-ahead log.
//!
//! A dedicated partition holds a header sector followed by a ring of
//! fixed-size records, three sectors each: a record header, a before
//! image and an after image. File-system operations stage their sector
//! modifications in a [`Txn`]; committing appends `begin`, one `data`
//! record per modified sector (first before image, last after image)
//! and `commit`, all durable before any home sector is written. The
//! after images then land in the buffer cache as dirty entries; the
//! log plus the dirty set is what survives a crash.
//!
//! Recovery scans the ring forward, stopping at the first record whose
//! checksum or generation number does not match: committed transactions
//! are redone forward, uncommitted ones undone backward, and the log is
//! truncated under a fresh generation.
//!
//! Checkpointing flushes every dirty cache entry home (their after
//! images are already logged) and resets the ring. A background worker
//! checkpoints at a high-water mark; a committer that finds the ring
//! full checkpoints inline, and commits arriving during a checkpoint
//! wait on the `space` condition variable.

use bytemuck::Zeroable;
use bytemuck_derive::{Pod as DerivePod, Zeroable as DeriveZeroable};
use osprey_util::crc32;

use crate::bcache::BufferCache;
use crate::os::{Condvar, Mutex};
use crate::prelude::*;

const WAL_MAGIC: u32 = 0x4C41_574F; // "OWAL"
const RECORD_SECTORS: u32 = 3;

/// Ring usage ratio beyond which the background worker checkpoints.
const HIGH_WATER_NUM: usize = 3;
const HIGH_WATER_DEN: usize = 4;

const TYPE_BEGIN: u32 = 1;
const TYPE_DATA: u32 = 2;
const TYPE_COMMIT: u32 = 3;

#[repr(C)]
#[derive(Clone, Copy, Debug, DerivePod, DeriveZeroable)]
struct WalHeader {
    magic: u32,
    head: u32,
    tail: u32,
    next_txn: u32,
    /// Generation number; bumped on every truncation so stale ring
    /// records from earlier generations never parse as live.
    checkpoint_seq: u32,
    checksum: u32,
}

impl WalHeader {
    fn compute_checksum(&self) -> u32 {
        let bytes = bytemuck::bytes_of(self);
        crc32(&bytes[..core::mem::size_of::<Self>() - 4])
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, DerivePod, DeriveZeroable)]
struct RecordHeader {
    txn_id: u32,
    seq: u32,
    rtype: u32,
    sector: u32,
    checksum: u32,
}

impl RecordHeader {
    fn compute_checksum(&self, before: &[u8; SECTOR_SIZE], after: &[u8; SECTOR_SIZE]) -> u32 {
        let bytes = bytemuck::bytes_of(self);
        let mut crc = crc32(&bytes[..core::mem::size_of::<Self>() - 4]);
        if self.rtype == TYPE_DATA {
            crc ^= crc32(before).rotate_left(1);
            crc ^= crc32(after).rotate_left(2);
        }
        crc
    }
}

struct WalInner {
    /// Next free record index. The head is always zero: truncation
    /// discards the whole ring rather than a prefix.
    tail: u32,
    next_txn: u32,
    seq: u32,
    checkpointing: bool,
}

/// The write-ahead log over its partition.
pub struct Wal {
    device: Partition,
    capacity: u32,
    inner: Mutex<WalInner>,
    space: Condvar,
}

/// A sector modification staged in a transaction.
pub(crate) struct TxnWrite {
    pub(crate) sector: Sid,
    pub(crate) before: Box<[u8; SECTOR_SIZE]>,
    pub(crate) after: Box<[u8; SECTOR_SIZE]>,
}

/// An open transaction.
///
/// Writes made through the buffer cache's `*_tx` methods are buffered
/// here, invisible to other threads, until [`Txn::commit`] logs them and
/// publishes the after images to the cache. Dropping an uncommitted
/// transaction aborts it; nothing has touched the cache or the disk.
pub struct Txn {
    pub(crate) id: u32,
    pub(crate) writes: Vec<TxnWrite>,
    wal: Arc<Wal>,
    cache: Arc<BufferCache>,
}

impl Txn {
    pub(crate) fn new(id: u32, wal: Arc<Wal>, cache: Arc<BufferCache>) -> Self {
        Txn {
            id,
            writes: Vec::new(),
            wal,
            cache,
        }
    }

    pub(crate) fn find(&self, sector: Sid) -> Option<usize> {
        self.writes.iter().position(|w| w.sector == sector)
    }

    /// Stages the modification of `sector`. `before` is captured only on
    /// the first touch; later stages coalesce into the same record.
    pub(crate) fn stage(&mut self, sector: Sid, before: &[u8; SECTOR_SIZE]) -> usize {
        match self.find(sector) {
            Some(idx) => idx,
            None => {
                self.writes.push(TxnWrite {
                    sector,
                    before: Box::new(*before),
                    after: Box::new(*before),
                });
                self.writes.len() - 1
            }
        }
    }

    /// Commits the transaction: the record set becomes durable in the
    /// log, then the after images are published to the buffer cache.
    pub fn commit(self) -> Result<()> {
        let Txn {
            id,
            writes,
            wal,
            cache,
        } = self;
        if writes.is_empty() {
            return Ok(());
        }
        wal.commit_writes(&cache, id, &writes);
        Ok(())
    }
}

/// What recovery found and did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryStats {
    pub committed_txns: usize,
    pub redone_sectors: usize,
    pub undone_sectors: usize,
}

impl Wal {
    /// Writes a fresh, empty log onto `device`.
    pub fn format(device: &Partition) {
        let header = WalHeader {
            magic: WAL_MAGIC,
            head: 0,
            tail: 0,
            next_txn: 1,
            checkpoint_seq: 1,
            checksum: 0,
        };
        Self::write_header_to(device, header);
    }

    /// Opens the log on `device`.
    ///
    /// # Panics
    ///
    /// Panics if the header magic does not match; the partition must
    /// have been formatted (and recovered) first.
    pub fn open(device: Partition) -> Arc<Wal> {
        let header = Self::read_header(&device);
        assert_eq!(header.magic, WAL_MAGIC, "write-ahead log not formatted");
        let capacity = (device.sector_count() - 1) / RECORD_SECTORS;
        assert!(capacity >= 8, "write-ahead log partition too small");
        Arc::new(Wal {
            device,
            capacity,
            inner: Mutex::new(WalInner {
                tail: header.tail,
                next_txn: header.next_txn,
                seq: header.checkpoint_seq,
                checkpointing: false,
            }),
            space: Condvar::new(),
        })
    }

    /// Replays the log against `home` (the file-system partition) after
    /// a crash. Committed transactions are redone forward, uncommitted
    /// ones undone backward, then the log is truncated.
    pub fn recover(device: &Partition, home: &Partition) -> RecoveryStats {
        let mut header = Self::read_header(device);
        if header.magic != WAL_MAGIC {
            return RecoveryStats::default();
        }

        struct DataRec {
            txn_id: u32,
            sector: Sid,
            before: Box<[u8; SECTOR_SIZE]>,
            after: Box<[u8; SECTOR_SIZE]>,
        }
        let mut data_recs: Vec<DataRec> = Vec::new();
        let mut committed: Vec<u32> = Vec::new();
        let capacity = (device.sector_count() - 1) / RECORD_SECTORS;

        for slot in 0..capacity {
            let base = 1 + slot * RECORD_SECTORS;
            let mut buf = [0u8; SECTOR_SIZE];
            device.read_sector(base, &mut buf);
            let rec: RecordHeader =
                *bytemuck::from_bytes(&buf[..core::mem::size_of::<RecordHeader>()]);
            if rec.seq != header.checkpoint_seq {
                break;
            }
            let (before, after) = if rec.rtype == TYPE_DATA {
                let mut before = Box::new([0u8; SECTOR_SIZE]);
                let mut after = Box::new([0u8; SECTOR_SIZE]);
                device.read_sector(base + 1, &mut before);
                device.read_sector(base + 2, &mut after);
                (before, after)
            } else {
                (Box::new([0u8; SECTOR_SIZE]), Box::new([0u8; SECTOR_SIZE]))
            };
            let mut expected = rec;
            expected.checksum = 0;
            if expected.compute_checksum(&before, &after) != rec.checksum {
                // A torn record ends the valid prefix.
                break;
            }
            match rec.rtype {
                TYPE_COMMIT => committed.push(rec.txn_id),
                TYPE_DATA => data_recs.push(DataRec {
                    txn_id: rec.txn_id,
                    sector: rec.sector,
                    before,
                    after,
                }),
                _ => {}
            }
        }

        let mut stats = RecoveryStats {
            committed_txns: committed.len(),
            ..Default::default()
        };
        for rec in data_recs.iter() {
            if committed.contains(&rec.txn_id) {
                home.write_sector(rec.sector, &rec.after);
                stats.redone_sectors += 1;
            }
        }
        for rec in data_recs.iter().rev() {
            if !committed.contains(&rec.txn_id) {
                home.write_sector(rec.sector, &rec.before);
                stats.undone_sectors += 1;
            }
        }
        if stats.redone_sectors > 0 || stats.undone_sectors > 0 {
            info!(
                "wal: recovered {} committed txns, {} sectors redone, {} undone",
                stats.committed_txns, stats.redone_sectors, stats.undone_sectors
            );
        }

        header.tail = 0;
        header.checkpoint_seq += 1;
        Self::write_header_to(device, header);
        stats
    }

    /// Allocates a transaction id.
    pub(crate) fn begin(&self) -> u32 {
        let mut inner = self.inner.lock();
        let id = inner.next_txn;
        inner.next_txn += 1;
        id
    }

    /// Appends `begin`, the data records and `commit` durably, then
    /// publishes the after images to the cache as dirty entries.
    pub(crate) fn commit_writes(&self, cache: &BufferCache, id: u32, writes: &[TxnWrite]) {
        let need = writes.len() as u32 + 2;
        assert!(
            need <= self.capacity,
            "transaction of {} records exceeds the log ring",
            writes.len()
        );

        let mut inner = self.inner.lock();
        loop {
            if inner.checkpointing {
                inner = self.space.wait(inner);
                continue;
            }
            if inner.tail + need <= self.capacity {
                break;
            }
            // Ring full: checkpoint inline. Dirty entries are committed
            // content, so flushing them home needs no further logging.
            debug!("wal: ring full, checkpointing inline");
            cache.flush_all();
            inner.tail = 0;
            inner.seq += 1;
            self.write_header(&inner);
        }

        let zero = [0u8; SECTOR_SIZE];
        self.append_record(&mut inner, id, TYPE_BEGIN, 0, &zero, &zero);
        for w in writes {
            self.append_record(&mut inner, id, TYPE_DATA, w.sector, &w.before, &w.after);
        }
        self.append_record(&mut inner, id, TYPE_COMMIT, 0, &zero, &zero);
        self.write_header(&inner);

        // The commit record is durable; the after images may now become
        // visible (and dirty) in the cache.
        for w in writes {
            cache.apply_committed(w.sector, &w.after);
        }
    }

    /// Flushes the cache and truncates the ring. Driven by the
    /// background worker above the high-water mark.
    pub fn checkpoint(&self, cache: &BufferCache) {
        {
            let mut inner = self.inner.lock();
            if inner.checkpointing {
                // Someone else is already at it; wait it out.
                while inner.checkpointing {
                    inner = self.space.wait(inner);
                }
                return;
            }
            inner.checkpointing = true;
        }

        // No commit can append (or dirty the cache) while the flag is
        // up, so the dirty set is exactly the logged after images.
        cache.flush_all();

        let mut inner = self.inner.lock();
        inner.tail = 0;
        inner.seq += 1;
        inner.checkpointing = false;
        self.write_header(&inner);
        drop(inner);
        self.space.notify_all();
    }

    /// Whether the ring has grown past the high-water mark.
    pub fn above_high_water(&self) -> bool {
        let inner = self.inner.lock();
        inner.tail as usize * HIGH_WATER_DEN >= self.capacity as usize * HIGH_WATER_NUM
    }

    fn append_record(
        &self,
        inner: &mut WalInner,
        txn_id: u32,
        rtype: u32,
        sector: Sid,
        before: &[u8; SECTOR_SIZE],
        after: &[u8; SECTOR_SIZE],
    ) {
        debug_assert!(inner.tail < self.capacity);
        let base = 1 + inner.tail * RECORD_SECTORS;
        let mut rec = RecordHeader {
            txn_id,
            seq: inner.seq,
            rtype,
            sector,
            checksum: 0,
        };
        rec.checksum = rec.compute_checksum(before, after);

        // The data sectors must be durable before the header sector:
        // a record is only as valid as its checksum.
        if rtype == TYPE_DATA {
            self.device.write_sector(base + 1, before);
            self.device.write_sector(base + 2, after);
        }
        let mut buf = [0u8; SECTOR_SIZE];
        buf[..core::mem::size_of::<RecordHeader>()].copy_from_slice(bytemuck::bytes_of(&rec));
        self.device.write_sector(base, &buf);
        inner.tail += 1;
    }

    fn read_header(device: &Partition) -> WalHeader {
        let mut buf = [0u8; SECTOR_SIZE];
        device.read_sector(0, &mut buf);
        let header: WalHeader = *bytemuck::from_bytes(&buf[..core::mem::size_of::<WalHeader>()]);
        let mut expected = header;
        expected.checksum = 0;
        if header.magic == WAL_MAGIC && header.checksum != expected.compute_checksum() {
            // A torn header write; treat the log as absent.
            return WalHeader::zeroed();
        }
        header
    }

    fn write_header(&self, inner: &WalInner) {
        let header = WalHeader {
            magic: WAL_MAGIC,
            head: 0,
            tail: inner.tail,
            next_txn: inner.next_txn,
            checkpoint_seq: inner.seq,
            checksum: 0,
        };
        Self::write_header_to(&self.device, header);
    }

    fn write_header_to(device: &Partition, mut header: WalHeader) {
        header.checksum = header.compute_checksum();
        let mut buf = [0u8; SECTOR_SIZE];
        buf[..core::mem::size_of::<WalHeader>()].copy_from_slice(bytemuck::bytes_of(&header));
        device.write_sector(0, &buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osprey_block::{BlockDevice, MemDisk};

    const HOME_SECTORS: Sid = 128;
    const WAL_SECTORS: Sid = 64;

    struct Rig {
        disk: Arc<MemDisk>,
        cache: Arc<BufferCache>,
    }

    fn setup() -> Rig {
        let disk = Arc::new(MemDisk::new(HOME_SECTORS + WAL_SECTORS));
        let wal_part = Partition::new(disk.clone(), HOME_SECTORS, WAL_SECTORS);
        Wal::format(&wal_part);
        let wal = Wal::open(wal_part);
        let home = Partition::new(disk.clone(), 0, HOME_SECTORS);
        let cache = BufferCache::new(home, wal);
        Rig { disk, cache }
    }

    /// Models a power cut: clone the disk as it is and run recovery on
    /// the clone, ignoring everything still in the cache.
    fn crash_and_recover(rig: &Rig) -> (Arc<MemDisk>, RecoveryStats) {
        let disk = Arc::new(rig.disk.snapshot());
        let wal_part = Partition::new(disk.clone(), HOME_SECTORS, WAL_SECTORS);
        let home = Partition::new(disk.clone(), 0, HOME_SECTORS);
        let stats = Wal::recover(&wal_part, &home);
        (disk, stats)
    }

    #[test]
    fn committed_but_unflushed_survives_crash() {
        let rig = setup();
        let mut txn = rig.cache.begin_tx();
        rig.cache.write_tx(&mut txn, 7, 0, b"persist me");
        txn.commit().unwrap();
        // No flush: the after image exists only in the log and cache.

        let (disk, stats) = crash_and_recover(&rig);
        assert_eq!(stats.committed_txns, 1);
        assert_eq!(stats.redone_sectors, 1);

        let mut sector = [0u8; SECTOR_SIZE];
        disk.read_sector(7, &mut sector);
        assert_eq!(&sector[..10], b"persist me");
    }

    #[test]
    fn torn_commit_record_reverts_txn() {
        let rig = setup();
        // Establish committed content on sector 3 and flush it home.
        let mut txn = rig.cache.begin_tx();
        rig.cache.write_tx(&mut txn, 3, 0, b"old");
        txn.commit().unwrap();
        rig.cache.flush_all();
        rig.cache.wal().checkpoint(&rig.cache);

        let mut txn = rig.cache.begin_tx();
        rig.cache.write_tx(&mut txn, 3, 0, b"new");
        txn.commit().unwrap();
        rig.cache.flush_all();

        let disk = Arc::new(rig.disk.snapshot());
        // Tear the commit record (slot 2: begin, data, commit) of the
        // second transaction.
        let commit_sector = HOME_SECTORS + 1 + 2 * RECORD_SECTORS;
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_sector(commit_sector, &mut buf);
        buf[0] ^= 0xFF;
        disk.write_sector(commit_sector, &buf);

        let wal_part = Partition::new(disk.clone(), HOME_SECTORS, WAL_SECTORS);
        let home = Partition::new(disk.clone(), 0, HOME_SECTORS);
        let stats = Wal::recover(&wal_part, &home);
        assert_eq!(stats.committed_txns, 0);
        assert_eq!(stats.undone_sectors, 1);

        disk.read_sector(3, &mut buf);
        assert_eq!(&buf[..3], b"old");
    }

    #[test]
    fn torn_data_record_ends_the_scan() {
        let rig = setup();
        let mut txn = rig.cache.begin_tx();
        rig.cache.write_tx(&mut txn, 11, 0, b"aaaa");
        rig.cache.write_tx(&mut txn, 12, 0, b"bbbb");
        txn.commit().unwrap();

        let disk = Arc::new(rig.disk.snapshot());
        // Tear the first data record; everything after it, the commit
        // record included, must be treated as absent.
        let data_sector = HOME_SECTORS + 1 + RECORD_SECTORS;
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_sector(data_sector, &mut buf);
        buf[4] ^= 0x01;
        disk.write_sector(data_sector, &buf);

        let wal_part = Partition::new(disk.clone(), HOME_SECTORS, WAL_SECTORS);
        let home = Partition::new(disk.clone(), 0, HOME_SECTORS);
        let stats = Wal::recover(&wal_part, &home);
        assert_eq!(stats.committed_txns, 0);
        assert_eq!(stats.redone_sectors, 0);
        assert_eq!(stats.undone_sectors, 0);

        disk.read_sector(11, &mut buf);
        assert_eq!(buf, [0u8; SECTOR_SIZE]);
    }

    #[test]
    fn checkpoint_truncates_and_survives() {
        let rig = setup();
        let mut txn = rig.cache.begin_tx();
        rig.cache.write_tx(&mut txn, 20, 0, b"checkpointed");
        txn.commit().unwrap();
        rig.cache.wal().checkpoint(&rig.cache);

        // Stale records from the old generation must not replay.
        let (disk, stats) = crash_and_recover(&rig);
        assert_eq!(stats.redone_sectors, 0);
        assert_eq!(stats.undone_sectors, 0);

        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_sector(20, &mut buf);
        assert_eq!(&buf[..12], b"checkpointed");
    }

    #[test]
    fn ring_full_checkpoints_inline() {
        let rig = setup();
        // Capacity is (64 - 1) / 3 = 21 records; each txn takes three.
        // Push well past one ring's worth.
        for i in 0..40u32 {
            let mut txn = rig.cache.begin_tx();
            let sector = (i % 8) as Sid;
            rig.cache.write_tx(&mut txn, sector, 0, &i.to_le_bytes());
            txn.commit().unwrap();
        }
        let (disk, _stats) = crash_and_recover(&rig);
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_sector(7 as Sid, &mut buf);
        assert_eq!(buf[..4], 39u32.to_le_bytes());
    }

    #[test]
    fn multiple_committed_txns_replay_in_order() {
        let rig = setup();
        for value in [b"one", b"two"] {
            let mut txn = rig.cache.begin_tx();
            rig.cache.write_tx(&mut txn, 5, 0, value);
            txn.commit().unwrap();
        }
        let (disk, stats) = crash_and_recover(&rig);
        assert_eq!(stats.committed_txns, 2);
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_sector(5, &mut buf);
        assert_eq!(&buf[..3], b"two");
    }
}

