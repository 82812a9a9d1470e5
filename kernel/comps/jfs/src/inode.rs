//! On-disk inodes and the open-inode table.
//!
//! An inode is exactly one sector: length, type flags, 123 direct
//! pointers, one single-indirect and one doubly indirect pointer, and a
//! magic tail. A symlink keeps its target inline in the pointer area.
//! Files grow on write; extension allocates data and indirect sectors
//! under the caller's transaction, so a crash mid-growth rolls the whole
//! step back.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use bytemuck_derive::{Pod as DerivePod, Zeroable as DeriveZeroable};
use static_assertions::const_assert_eq;

use crate::bcache::BufferCache;
use crate::fs::FsContext;
use crate::os::{Mutex, RwMutex};
use crate::prelude::*;
use crate::wal::Txn;

/// Direct pointers in one inode.
pub(crate) const DIRECT_COUNT: usize = 123;
/// Sector pointers held by one indirect sector.
pub(crate) const PTRS_PER_SECTOR: usize = SECTOR_SIZE / 4;

/// The largest block index an inode can map.
pub(crate) const MAX_BLOCKS: u32 =
    (DIRECT_COUNT + PTRS_PER_SECTOR + PTRS_PER_SECTOR * PTRS_PER_SECTOR) as u32;
/// The largest file the layout supports, in bytes.
pub const MAX_FILE_SIZE: usize = MAX_BLOCKS as usize * SECTOR_SIZE;

/// A symlink target lives inline in the pointer area.
pub const MAX_SYMLINK_LEN: usize = 500;

const INODE_MAGIC: u32 = 0x494E_4F44;

const KIND_FILE: u8 = 0;
const KIND_DIR: u8 = 1;

#[repr(C)]
#[derive(Clone, Copy, DerivePod, DeriveZeroable)]
pub(crate) struct DiskInode {
    length: u32,
    is_dir: u8,
    is_symlink: u8,
    reserved: [u8; 2],
    direct: [u32; DIRECT_COUNT],
    indirect: u32,
    double_indirect: u32,
    magic: u32,
}

const_assert_eq!(core::mem::size_of::<DiskInode>(), SECTOR_SIZE);

/// Where a block index lives in the pointer tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockPath {
    /// Direct reference: the index into the inode's own pointer array.
    Direct(usize),
    /// The index within the single-indirect sector.
    Indirect(usize),
    /// Indices within the first-level and second-level sectors.
    DblIndirect(usize, usize),
}

impl From<u32> for BlockPath {
    fn from(block: u32) -> Self {
        let block = block as usize;
        if block < DIRECT_COUNT {
            BlockPath::Direct(block)
        } else if block < DIRECT_COUNT + PTRS_PER_SECTOR {
            BlockPath::Indirect(block - DIRECT_COUNT)
        } else {
            assert!((block as u32) < MAX_BLOCKS);
            let rel = block - DIRECT_COUNT - PTRS_PER_SECTOR;
            BlockPath::DblIndirect(rel / PTRS_PER_SECTOR, rel % PTRS_PER_SECTOR)
        }
    }
}

impl DiskInode {
    fn new_file() -> Self {
        let mut inode = Self::zeroed_with_magic();
        inode.is_dir = KIND_FILE;
        inode
    }

    fn new_dir() -> Self {
        let mut inode = Self::zeroed_with_magic();
        inode.is_dir = KIND_DIR;
        inode
    }

    fn new_symlink(target: &str) -> Self {
        let mut inode = Self::zeroed_with_magic();
        inode.is_symlink = 1;
        inode.length = target.len() as u32;
        let bytes = bytemuck::bytes_of_mut(&mut inode);
        bytes[8..8 + target.len()].copy_from_slice(target.as_bytes());
        inode
    }

    fn zeroed_with_magic() -> Self {
        let mut inode: DiskInode = bytemuck::Zeroable::zeroed();
        inode.magic = INODE_MAGIC;
        inode
    }

    pub(crate) fn read_from(cache: &BufferCache, sector: Sid) -> Self {
        let mut buf = [0u8; SECTOR_SIZE];
        cache.read(sector, 0, &mut buf);
        let inode: DiskInode = *bytemuck::from_bytes(&buf);
        assert_eq!(inode.magic, INODE_MAGIC, "bad inode magic at sector {}", sector);
        inode
    }

    fn read_from_tx(cache: &BufferCache, txn: &Txn, sector: Sid) -> Self {
        let mut buf = [0u8; SECTOR_SIZE];
        cache.read_tx(txn, sector, 0, &mut buf);
        let inode: DiskInode = *bytemuck::from_bytes(&buf);
        assert_eq!(inode.magic, INODE_MAGIC, "bad inode magic at sector {}", sector);
        inode
    }

    fn write_tx(&self, cache: &BufferCache, txn: &mut Txn, sector: Sid) {
        cache.write_tx(txn, sector, 0, bytemuck::bytes_of(self));
    }

    pub(crate) fn direct(&self, idx: usize) -> Sid {
        self.direct[idx]
    }

    fn symlink_target(&self) -> String {
        let bytes = bytemuck::bytes_of(self);
        let len = self.length as usize;
        String::from_utf8_lossy(&bytes[8..8 + len]).into_owned()
    }
}

/// An open inode. At most one of these exists per on-disk inode; the
/// open-inode table deduplicates. The `Arc` strong count doubles as the
/// open count that guards directory removal.
pub struct Inode {
    sector: Sid,
    ctx: Arc<FsContext>,
    /// Guards file content; extension happens with this held for write.
    data_lock: RwMutex<()>,
    /// Serialises growth decisions.
    ext_lock: Mutex<()>,
    deny_write: AtomicU32,
    removed: AtomicBool,
}

impl Debug for Inode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Inode")
            .field("sector", &self.sector)
            .finish_non_exhaustive()
    }
}

impl Inode {
    pub fn inumber(&self) -> u32 {
        self.sector
    }

    pub fn length(&self) -> usize {
        DiskInode::read_from(&self.ctx.cache, self.sector).length as usize
    }

    pub fn is_dir(&self) -> bool {
        DiskInode::read_from(&self.ctx.cache, self.sector).is_dir == KIND_DIR
    }

    pub fn is_symlink(&self) -> bool {
        DiskInode::read_from(&self.ctx.cache, self.sector).is_symlink != 0
    }

    pub fn symlink_target(&self) -> Result<String> {
        let disk_inode = DiskInode::read_from(&self.ctx.cache, self.sector);
        if disk_inode.is_symlink == 0 {
            return_errno!(Errno::InvalidArgs);
        }
        Ok(disk_inode.symlink_target())
    }

    /// Denies writes through this inode (used while an executable runs).
    pub fn deny_write(&self) {
        self.deny_write.fetch_add(1, Ordering::Relaxed);
    }

    pub fn allow_write(&self) {
        let prev = self.deny_write.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev > 0);
    }

    pub fn is_write_denied(&self) -> bool {
        self.deny_write.load(Ordering::Relaxed) > 0
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Relaxed)
    }

    /// Whether anyone besides the caller's `own_refs` handles keeps this
    /// inode open (an open file, a process cwd).
    pub fn open_elsewhere(self: &Arc<Self>, own_refs: usize) -> bool {
        Arc::strong_count(self) > own_refs
    }

    /// Reads up to `buf.len()` bytes at `offset`, returning the count;
    /// short at end of file.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let _guard = self.data_lock.read();
        let length = self.length();
        if offset >= length {
            return Ok(0);
        }
        let to_read = buf.len().min(length - offset);

        let mut done = 0;
        while done < to_read {
            let pos = offset + done;
            let block = (pos / SECTOR_SIZE) as u32;
            let sector_off = pos % SECTOR_SIZE;
            let chunk = to_read.min(done + (SECTOR_SIZE - sector_off)) - done;
            let sid = self.block_at(None, block);
            assert!(sid != 0, "hole in a non-sparse file");
            self.ctx
                .cache
                .read(sid, sector_off, &mut buf[done..done + chunk]);
            done += chunk;
        }

        // Hint the next block to the read-ahead worker.
        let next_block = ((offset + to_read) / SECTOR_SIZE) as u32;
        if (next_block as usize) * SECTOR_SIZE < length {
            let sid = self.block_at(None, next_block);
            if sid != 0 {
                self.ctx.cache.prefetch(sid);
            }
        }
        Ok(to_read)
    }

    /// Writes `buf` at `offset` under `txn`, growing the file as needed.
    /// The growth and the data land atomically with the rest of the
    /// transaction. Returns the number of bytes written: 0 if writes are
    /// denied, short only at the file-size limit.
    pub fn write_at(&self, txn: &mut Txn, offset: usize, buf: &[u8]) -> Result<usize> {
        if self.is_write_denied() {
            return Ok(0);
        }
        let _guard = self.data_lock.write();

        let end = (offset + buf.len()).min(MAX_FILE_SIZE);
        if end <= offset {
            return Ok(0);
        }
        let to_write = end - offset;

        let old_length = DiskInode::read_from_tx(&self.ctx.cache, txn, self.sector).length as usize;
        if end > old_length {
            self.extend(txn, old_length, end)?;
        }

        let mut done = 0;
        while done < to_write {
            let pos = offset + done;
            let block = (pos / SECTOR_SIZE) as u32;
            let sector_off = pos % SECTOR_SIZE;
            let chunk = to_write.min(done + (SECTOR_SIZE - sector_off)) - done;
            let sid = self.block_at(Some(txn), block);
            assert!(sid != 0, "hole in a non-sparse file");
            self.ctx
                .cache
                .write_tx(txn, sid, sector_off, &buf[done..done + chunk]);
            done += chunk;
        }
        Ok(to_write)
    }

    /// Grows the file to at least `new_length` zero-filled bytes.
    pub(crate) fn grow(&self, txn: &mut Txn, new_length: usize) -> Result<()> {
        let _guard = self.data_lock.write();
        let old_length = DiskInode::read_from_tx(&self.ctx.cache, txn, self.sector).length as usize;
        if new_length > old_length {
            self.extend(txn, old_length, new_length.min(MAX_FILE_SIZE))?;
        }
        Ok(())
    }

    /// Grows the file to `new_length` bytes, allocating zeroed data
    /// sectors and any indirect sectors along the way.
    fn extend(&self, txn: &mut Txn, old_length: usize, new_length: usize) -> Result<()> {
        let _guard = self.ext_lock.lock();
        let cache = &self.ctx.cache;
        let mut disk_inode = DiskInode::read_from_tx(cache, txn, self.sector);

        let old_blocks = old_length.div_ceil(SECTOR_SIZE) as u32;
        let new_blocks = new_length.div_ceil(SECTOR_SIZE) as u32;
        for block in old_blocks..new_blocks {
            let sid = {
                let mut free_map = self.ctx.free_map.lock();
                free_map.allocate(cache, txn)?
            };
            cache.zero_tx(txn, sid);
            self.set_block(txn, &mut disk_inode, block, sid)?;
        }
        disk_inode.length = new_length as u32;
        disk_inode.write_tx(cache, txn, self.sector);
        Ok(())
    }

    /// Resolves block index → sector, 0 when unmapped. Reads through
    /// `txn` when given so extension sees its own pointer writes.
    fn block_at(&self, txn: Option<&Txn>, block: u32) -> Sid {
        let cache = &self.ctx.cache;
        let read_u32 = |sector: Sid, idx: usize| -> u32 {
            let mut word = [0u8; 4];
            match txn {
                Some(txn) => cache.read_tx(txn, sector, idx * 4, &mut word),
                None => cache.read(sector, idx * 4, &mut word),
            }
            u32::from_le_bytes(word)
        };
        let disk_inode = match txn {
            Some(txn) => DiskInode::read_from_tx(cache, txn, self.sector),
            None => DiskInode::read_from(cache, self.sector),
        };
        match BlockPath::from(block) {
            BlockPath::Direct(idx) => disk_inode.direct[idx],
            BlockPath::Indirect(idx) => {
                if disk_inode.indirect == 0 {
                    return 0;
                }
                read_u32(disk_inode.indirect, idx)
            }
            BlockPath::DblIndirect(l1, l2) => {
                if disk_inode.double_indirect == 0 {
                    return 0;
                }
                let mid = read_u32(disk_inode.double_indirect, l1);
                if mid == 0 {
                    return 0;
                }
                read_u32(mid, l2)
            }
        }
    }

    /// Installs `sid` as the block `block`, allocating indirect sectors
    /// on first use. The caller writes the inode sector back afterwards.
    fn set_block(&self, txn: &mut Txn, disk_inode: &mut DiskInode, block: u32, sid: Sid) -> Result<()> {
        let cache = &self.ctx.cache;
        let mut alloc_meta = |txn: &mut Txn| -> Result<Sid> {
            let sector = {
                let mut free_map = self.ctx.free_map.lock();
                free_map.allocate(cache, txn)?
            };
            cache.zero_tx(txn, sector);
            Ok(sector)
        };
        match BlockPath::from(block) {
            BlockPath::Direct(idx) => {
                disk_inode.direct[idx] = sid;
            }
            BlockPath::Indirect(idx) => {
                if disk_inode.indirect == 0 {
                    disk_inode.indirect = alloc_meta(txn)?;
                }
                cache.write_tx(txn, disk_inode.indirect, idx * 4, &sid.to_le_bytes());
            }
            BlockPath::DblIndirect(l1, l2) => {
                if disk_inode.double_indirect == 0 {
                    disk_inode.double_indirect = alloc_meta(txn)?;
                }
                let mut word = [0u8; 4];
                cache.read_tx(txn, disk_inode.double_indirect, l1 * 4, &mut word);
                let mut mid = u32::from_le_bytes(word);
                if mid == 0 {
                    mid = alloc_meta(txn)?;
                    cache.write_tx(txn, disk_inode.double_indirect, l1 * 4, &mid.to_le_bytes());
                }
                cache.write_tx(txn, mid, l2 * 4, &sid.to_le_bytes());
            }
        }
        Ok(())
    }

    /// Frees every sector the inode owns, in one transaction. Runs when
    /// the last handle to a removed inode goes away.
    fn deallocate(&self) {
        let _tx_guard = self.ctx.tx_lock.lock();
        let cache = &self.ctx.cache;
        let mut txn = cache.begin_tx();
        let disk_inode = DiskInode::read_from(cache, self.sector);

        if disk_inode.is_symlink == 0 {
            let blocks = (disk_inode.length as usize).div_ceil(SECTOR_SIZE) as u32;
            let mut free_map = self.ctx.free_map.lock();
            for block in 0..blocks {
                let sid = self.block_at(None, block);
                if sid != 0 {
                    free_map.release(cache, &mut txn, sid);
                }
            }
            if disk_inode.indirect != 0 {
                free_map.release(cache, &mut txn, disk_inode.indirect);
            }
            if disk_inode.double_indirect != 0 {
                for l1 in 0..PTRS_PER_SECTOR {
                    let mut word = [0u8; 4];
                    cache.read(disk_inode.double_indirect, l1 * 4, &mut word);
                    let mid = u32::from_le_bytes(word);
                    if mid != 0 {
                        free_map.release(cache, &mut txn, mid);
                    }
                }
                free_map.release(cache, &mut txn, disk_inode.double_indirect);
            }
            free_map.release(cache, &mut txn, self.sector);
        } else {
            let mut free_map = self.ctx.free_map.lock();
            free_map.release(cache, &mut txn, self.sector);
        }

        if let Err(err) = txn.commit() {
            error!("inode {}: deallocation failed: {:?}", self.sector, err);
        }
    }
}

impl Drop for Inode {
    fn drop(&mut self) {
        self.ctx.inodes.forget(self.sector);
        if self.is_removed() {
            self.deallocate();
        }
    }
}

/// The table of open inodes, keyed by inode sector.
pub(crate) struct InodeTable {
    map: Mutex<BTreeMap<Sid, Weak<Inode>>>,
}

impl InodeTable {
    pub(crate) fn new() -> Self {
        InodeTable {
            map: Mutex::new(BTreeMap::new()),
        }
    }

    /// Opens the inode at `sector`, reusing the live instance if any.
    pub(crate) fn open(&self, ctx: &Arc<FsContext>, sector: Sid) -> Arc<Inode> {
        let mut map = self.map.lock();
        if let Some(inode) = map.get(&sector).and_then(Weak::upgrade) {
            return inode;
        }
        let inode = Arc::new(Inode {
            sector,
            ctx: ctx.clone(),
            data_lock: RwMutex::new(()),
            ext_lock: Mutex::new(()),
            deny_write: AtomicU32::new(0),
            removed: AtomicBool::new(false),
        });
        map.insert(sector, Arc::downgrade(&inode));
        inode
    }

    /// Drops the table entry for `sector` if it is dead.
    fn forget(&self, sector: Sid) {
        let mut map = self.map.lock();
        if let Some(weak) = map.get(&sector) {
            if weak.strong_count() == 0 {
                map.remove(&sector);
            }
        }
    }
}

/// Creates a fresh file or directory inode under `txn`, allocating its
/// sector from the free map.
pub(crate) fn create_inode(
    ctx: &Arc<FsContext>,
    txn: &mut Txn,
    is_dir: bool,
) -> Result<Arc<Inode>> {
    let sector = {
        let mut free_map = ctx.free_map.lock();
        free_map.allocate(&ctx.cache, txn)?
    };
    let disk_inode = if is_dir {
        DiskInode::new_dir()
    } else {
        DiskInode::new_file()
    };
    disk_inode.write_tx(&ctx.cache, txn, sector);
    Ok(ctx.inodes.open(ctx, sector))
}

/// Creates a symlink inode holding `target` inline.
pub(crate) fn create_symlink_inode(
    ctx: &Arc<FsContext>,
    txn: &mut Txn,
    target: &str,
) -> Result<Arc<Inode>> {
    if target.len() > MAX_SYMLINK_LEN {
        return_errno_with_message!(Errno::NameTooLong, "symlink target too long");
    }
    let sector = {
        let mut free_map = ctx.free_map.lock();
        free_map.allocate(&ctx.cache, txn)?
    };
    DiskInode::new_symlink(target).write_tx(&ctx.cache, txn, sector);
    Ok(ctx.inodes.open(ctx, sector))
}

/// Writes the boot-strap inodes (root directory, free map) at format
/// time; they are not allocated through the free map.
pub(crate) fn format_inode_at(cache: &BufferCache, txn: &mut Txn, sector: Sid, is_dir: bool) {
    let disk_inode = if is_dir {
        DiskInode::new_dir()
    } else {
        DiskInode::new_file()
    };
    disk_inode.write_tx(cache, txn, sector);
}

/// Points the free-map file at its pre-carved store sectors.
pub(crate) fn format_free_map_inode(cache: &BufferCache, txn: &mut Txn, sector: Sid, store: &[Sid]) {
    let mut disk_inode = DiskInode::new_file();
    disk_inode.length = (store.len() * SECTOR_SIZE) as u32;
    for (idx, &sid) in store.iter().enumerate() {
        disk_inode.direct[idx] = sid;
    }
    disk_inode.write_tx(cache, txn, sector);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_path_boundaries() {
        assert_eq!(BlockPath::from(0), BlockPath::Direct(0));
        assert_eq!(BlockPath::from(122), BlockPath::Direct(122));
        assert_eq!(BlockPath::from(123), BlockPath::Indirect(0));
        assert_eq!(BlockPath::from(250), BlockPath::Indirect(127));
        assert_eq!(BlockPath::from(251), BlockPath::DblIndirect(0, 0));
        assert_eq!(BlockPath::from(251 + 128), BlockPath::DblIndirect(1, 0));
        assert_eq!(BlockPath::from(MAX_BLOCKS - 1), BlockPath::DblIndirect(127, 127));
    }

    #[test]
    fn symlink_target_round_trip() {
        let inode = DiskInode::new_symlink("/a/b/c");
        assert_eq!(inode.symlink_target(), "/a/b/c");
        assert_eq!(inode.is_symlink, 1);
    }

    #[test]
    fn disk_layout_is_one_sector() {
        assert_eq!(core::mem::size_of::<DiskInode>(), SECTOR_SIZE);
    }
}
