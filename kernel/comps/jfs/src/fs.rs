//! The file-system façade.
//!
//! [`Jfs`] ties the layers together: mount-time recovery, the buffer
//! cache and its background workers, the free map, the open-inode table
//! and path resolution. Operations that mutate the disk run inside one
//! write-ahead-log transaction each and are serialised by a single
//! transaction lock, so no two in-flight transactions ever stage the
//! same sector. Readers run concurrently against committed state.

use crate::bcache::{BufferCache, FLUSH_INTERVAL_MS};
use crate::dir::{self, Dir, DirEntryInfo};
use crate::free_map::FreeMap;
use crate::inode::{self, Inode, InodeTable};
use crate::os::{self, Mutex};
use crate::path::{self, FollowFinal};
use crate::prelude::*;
use crate::wal::Wal;

/// Sector of the root directory inode on the file-system partition.
pub const ROOT_DIR_SECTOR: Sid = 1;
/// Sector of the free-map inode.
pub const FREE_MAP_SECTOR: Sid = 2;

/// Sectors reserved ahead of the free-map store: boot block, root
/// directory inode, free-map inode.
const RESERVED_SECTORS: Sid = 3;

/// How often the checkpoint worker looks at the ring, in milliseconds.
const CHECKPOINT_POLL_MS: u64 = 1000;

/// Shared state every layer hangs off.
pub(crate) struct FsContext {
    pub(crate) cache: Arc<BufferCache>,
    pub(crate) free_map: Mutex<FreeMap>,
    pub(crate) inodes: InodeTable,
    /// Held by every mutating operation from transaction begin to
    /// commit: two in-flight transactions must never stage the same
    /// sector, and the free map and directories would otherwise allow
    /// exactly that.
    pub(crate) tx_lock: Mutex<()>,
}

/// Mount-time knobs.
#[derive(Debug, Clone, Copy)]
pub struct MountOptions {
    /// Format the partitions before mounting.
    pub format: bool,
    /// Spawn the read-ahead, periodic-flush and checkpoint workers.
    /// Tests that want determinism leave them off and drive flushes
    /// explicitly.
    pub spawn_workers: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        MountOptions {
            format: false,
            spawn_workers: true,
        }
    }
}

/// The mounted file system.
pub struct Jfs {
    ctx: Arc<FsContext>,
    root: Arc<Inode>,
}

impl Jfs {
    /// Lays down an empty file system: a fresh log, the root directory
    /// and the free map.
    pub fn format(filesys: &Partition, wal_part: &Partition) {
        Wal::format(wal_part);
        let wal = Wal::open(wal_part.clone());
        let cache = BufferCache::new(filesys.clone(), wal);
        let free_map = FreeMap::create(filesys.sector_count(), RESERVED_SECTORS);

        // First transaction: both bootstrap inodes plus the bitmap.
        let mut txn = cache.begin_tx();
        inode::format_inode_at(&cache, &mut txn, ROOT_DIR_SECTOR, true);
        inode::format_free_map_inode(&cache, &mut txn, FREE_MAP_SECTOR, free_map.store());
        free_map.persist_all(&cache, &mut txn);
        txn.commit().expect("formatting must not fail");

        // Second transaction: the root's dot entries, now that the root
        // inode is committed and readable.
        let ctx = Arc::new(FsContext {
            cache: cache.clone(),
            free_map: Mutex::new(free_map),
            inodes: InodeTable::new(),
            tx_lock: Mutex::new(()),
        });
        let root = ctx.inodes.open(&ctx, ROOT_DIR_SECTOR);
        let mut txn = cache.begin_tx();
        dir::write_dots(&root, &mut txn, ROOT_DIR_SECTOR).expect("root dots");
        txn.commit().expect("formatting must not fail");

        cache.flush_all();
        info!("jfs: formatted {} sectors", filesys.sector_count());
    }

    /// Mounts the file system: log recovery first, then the cache and
    /// the background workers.
    pub fn mount(filesys: Partition, wal_part: Partition, options: MountOptions) -> Arc<Jfs> {
        if options.format {
            Self::format(&filesys, &wal_part);
        }

        let stats = Wal::recover(&wal_part, &filesys);
        debug!("jfs: mount recovery: {:?}", stats);

        let wal = Wal::open(wal_part);
        let cache = BufferCache::new(filesys.clone(), wal.clone());
        let free_map = FreeMap::load(&cache, FREE_MAP_SECTOR, filesys.sector_count());
        let ctx = Arc::new(FsContext {
            cache: cache.clone(),
            free_map: Mutex::new(free_map),
            inodes: InodeTable::new(),
            tx_lock: Mutex::new(()),
        });
        let root = ctx.inodes.open(&ctx, ROOT_DIR_SECTOR);

        if options.spawn_workers {
            let ra_cache = cache.clone();
            os::spawn_worker("jfs-readahead", move || ra_cache.readahead_loop());

            let flush_cache = cache.clone();
            os::spawn_worker("jfs-flush", move || loop {
                os::sleep_ms(FLUSH_INTERVAL_MS);
                flush_cache.flush_all();
            });

            let ckpt_cache = cache;
            os::spawn_worker("jfs-checkpoint", move || loop {
                os::sleep_ms(CHECKPOINT_POLL_MS);
                if wal.above_high_water() {
                    wal.checkpoint(&ckpt_cache);
                }
            });
        }

        Arc::new(Jfs { ctx, root })
    }

    /// The root directory inode; a process's first working directory.
    pub fn root(&self) -> Arc<Inode> {
        self.root.clone()
    }

    /// Creates a regular file of `initial_size` zero bytes. The entry
    /// appears atomically; a large initial size is then grown in
    /// bounded transactions (see `grow_to`).
    pub fn create(&self, cwd: &Arc<Inode>, path: &str, initial_size: usize) -> Result<()> {
        let (parent, name) = path::resolve_parent(&self.ctx, &self.root, cwd, path)?;
        let node = {
            let _tx_guard = self.ctx.tx_lock.lock();
            if parent.lookup(&name).is_ok() {
                return_errno!(Errno::Exists);
            }
            let mut txn = self.ctx.cache.begin_tx();
            let node = inode::create_inode(&self.ctx, &mut txn, false)?;
            parent.add(&mut txn, &name, node.inumber())?;
            txn.commit()?;
            node
        };
        grow_to(&self.ctx, &node, initial_size)
    }

    /// Opens a file or directory, following symlinks.
    pub fn open(self: &Arc<Self>, cwd: &Arc<Inode>, path: &str) -> Result<Arc<FileHandle>> {
        let node = path::resolve(&self.ctx, &self.root, cwd, path, FollowFinal::Yes)?;
        Ok(Arc::new(FileHandle {
            inode: node,
            pos: Mutex::new(0),
            ctx: self.ctx.clone(),
        }))
    }

    /// Resolves a path to a directory inode, for `chdir`.
    pub fn open_dir(&self, cwd: &Arc<Inode>, path: &str) -> Result<Arc<Inode>> {
        let node = path::resolve(&self.ctx, &self.root, cwd, path, FollowFinal::Yes)?;
        if !node.is_dir() {
            return_errno!(Errno::NotDir);
        }
        Ok(node)
    }

    /// Removes a file, an empty directory, or a symlink (the link
    /// itself, not its target).
    pub fn remove(&self, cwd: &Arc<Inode>, path: &str) -> Result<()> {
        let (parent, name) = path::resolve_parent(&self.ctx, &self.root, cwd, path)?;
        let target = {
            let sector = parent.lookup(&name)?;
            self.ctx.inodes.open(&self.ctx, sector)
        };
        if target.inumber() == ROOT_DIR_SECTOR {
            return_errno_with_message!(Errno::Busy, "cannot remove the root directory");
        }
        {
            let _tx_guard = self.ctx.tx_lock.lock();
            if target.is_dir() {
                let dir = Dir::new(target.clone())?;
                if !dir.is_empty()? {
                    return_errno!(Errno::NotEmpty);
                }
                // Two handles are ours: `target` and the one in `dir`.
                // Anything beyond that is an open handle or a cwd.
                if target.open_elsewhere(2) {
                    return_errno_with_message!(Errno::Busy, "directory is in use");
                }
            }
            let mut txn = self.ctx.cache.begin_tx();
            parent.remove(&mut txn, &name)?;
            txn.commit()?;
            target.mark_removed();
        }
        // `target` drops here, after the transaction lock: if ours was
        // the last handle, deallocation opens its own transaction.
        Ok(())
    }

    /// Creates a directory with its `.` and `..` entries.
    pub fn mkdir(&self, cwd: &Arc<Inode>, path: &str) -> Result<()> {
        let (parent, name) = path::resolve_parent(&self.ctx, &self.root, cwd, path)?;
        let _tx_guard = self.ctx.tx_lock.lock();
        if parent.lookup(&name).is_ok() {
            return_errno!(Errno::Exists);
        }
        let mut txn = self.ctx.cache.begin_tx();
        let node = inode::create_inode(&self.ctx, &mut txn, true)?;
        dir::write_dots(&node, &mut txn, parent.inode().inumber())?;
        parent.add(&mut txn, &name, node.inumber())?;
        txn.commit()
    }

    /// Creates a symlink at `linkpath` holding `target` verbatim.
    pub fn symlink(&self, cwd: &Arc<Inode>, target: &str, linkpath: &str) -> Result<()> {
        if target.is_empty() {
            return_errno!(Errno::InvalidArgs);
        }
        let (parent, name) = path::resolve_parent(&self.ctx, &self.root, cwd, linkpath)?;
        let _tx_guard = self.ctx.tx_lock.lock();
        if parent.lookup(&name).is_ok() {
            return_errno!(Errno::Exists);
        }
        let mut txn = self.ctx.cache.begin_tx();
        let node = inode::create_symlink_inode(&self.ctx, &mut txn, target)?;
        parent.add(&mut txn, &name, node.inumber())?;
        txn.commit()
    }

    /// Reads a symlink's target without following it.
    pub fn readlink(&self, cwd: &Arc<Inode>, path: &str) -> Result<String> {
        let node = path::resolve(&self.ctx, &self.root, cwd, path, FollowFinal::No)?;
        node.symlink_target()
    }

    /// Moves `from` to `to` in one transaction. The destination must
    /// not exist.
    pub fn rename(&self, cwd: &Arc<Inode>, from: &str, to: &str) -> Result<()> {
        let (from_parent, from_name) = path::resolve_parent(&self.ctx, &self.root, cwd, from)?;
        let (to_parent, to_name) = path::resolve_parent(&self.ctx, &self.root, cwd, to)?;
        let _tx_guard = self.ctx.tx_lock.lock();
        if to_parent.lookup(&to_name).is_ok() {
            return_errno!(Errno::Exists);
        }
        let mut txn = self.ctx.cache.begin_tx();
        let inumber = from_parent.remove(&mut txn, &from_name)?;
        to_parent.add(&mut txn, &to_name, inumber)?;
        txn.commit()
    }

    /// Writes every dirty buffer home. The periodic worker does this on
    /// its own; shutdown and tests call it directly.
    pub fn flush(&self) {
        self.ctx.cache.flush_all();
    }
}

/// Sector writes staged per transaction are bounded by splitting file
/// growth and large writes into steps of this many bytes, so no single
/// transaction can outgrow the log ring.
const GROW_TXN_CHUNK: usize = 16 * 1024;

/// Grows `inode` to at least `target` bytes in bounded transactions.
fn grow_to(ctx: &Arc<FsContext>, inode: &Arc<Inode>, target: usize) -> Result<()> {
    loop {
        let current = inode.length();
        if current >= target {
            return Ok(());
        }
        let step = (current + GROW_TXN_CHUNK).min(target);
        let _tx_guard = ctx.tx_lock.lock();
        let mut txn = ctx.cache.begin_tx();
        inode.grow(&mut txn, step)?;
        txn.commit()?;
    }
}

/// An open file (or directory): an inode plus a position.
pub struct FileHandle {
    inode: Arc<Inode>,
    pos: Mutex<usize>,
    ctx: Arc<FsContext>,
}

impl Debug for FileHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileHandle")
            .field("inumber", &self.inode.inumber())
            .finish_non_exhaustive()
    }
}

impl FileHandle {
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    pub fn size(&self) -> usize {
        self.inode.length()
    }

    pub fn is_dir(&self) -> bool {
        self.inode.is_dir()
    }

    /// Reads from the current position, advancing it.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut pos = self.pos.lock();
        let n = self.inode.read_at(*pos, buf)?;
        *pos += n;
        Ok(n)
    }

    /// Writes at the current position, advancing it. One transaction
    /// per call: the data, any growth, and the free-map updates land
    /// atomically.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if self.is_dir() {
            return_errno!(Errno::IsDir);
        }
        let mut pos = self.pos.lock();
        let n = self.write_at(*pos, buf)?;
        *pos += n;
        Ok(n)
    }

    /// Positioned read; does not move the handle's position.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize> {
        self.inode.read_at(offset, buf)
    }

    /// Positioned write; does not move the handle's position. Large
    /// writes are split across transactions so no single transaction
    /// outgrows the log ring; each chunk is still crash-atomic. A gap
    /// between end of file and `offset` is zero-filled the same way.
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize> {
        grow_to(&self.ctx, &self.inode, offset)?;

        let mut done = 0;
        while done < buf.len() {
            let chunk = (buf.len() - done).min(GROW_TXN_CHUNK);
            let n = {
                let _tx_guard = self.ctx.tx_lock.lock();
                let mut txn = self.ctx.cache.begin_tx();
                let n = self.inode.write_at(&mut txn, offset + done, &buf[done..done + chunk])?;
                txn.commit()?;
                n
            };
            done += n;
            if n < chunk {
                break;
            }
        }
        Ok(done)
    }

    pub fn seek(&self, pos: usize) {
        *self.pos.lock() = pos;
    }

    pub fn tell(&self) -> usize {
        *self.pos.lock()
    }

    /// Reads the next directory entry name, skipping `.`, `..` and
    /// holes. Returns `None` at the end.
    pub fn readdir(&self) -> Result<Option<DirEntryInfo>> {
        let dir = Dir::new(self.inode.clone())?;
        let mut pos = self.pos.lock();
        loop {
            let Some(entry) = dir.entry_at(*pos)? else {
                return Ok(None);
            };
            *pos += 1;
            if entry.name.is_empty() || entry.name == "." || entry.name == ".." {
                continue;
            }
            return Ok(Some(entry));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osprey_block::MemDisk;

    const FILESYS_SECTORS: Sid = 4096;
    const WAL_SECTORS: Sid = 256;

    fn partitions(disk: &Arc<MemDisk>) -> (Partition, Partition) {
        let filesys = Partition::new(disk.clone(), 0, FILESYS_SECTORS);
        let wal = Partition::new(disk.clone(), FILESYS_SECTORS, WAL_SECTORS);
        (filesys, wal)
    }

    fn fresh_fs() -> (Arc<MemDisk>, Arc<Jfs>) {
        let disk = Arc::new(MemDisk::new(FILESYS_SECTORS + WAL_SECTORS));
        let (filesys, wal) = partitions(&disk);
        let fs = Jfs::mount(
            filesys,
            wal,
            MountOptions {
                format: true,
                spawn_workers: false,
            },
        );
        (disk, fs)
    }

    fn remount(disk: &Arc<MemDisk>) -> Arc<Jfs> {
        let (filesys, wal) = partitions(disk);
        Jfs::mount(
            filesys,
            wal,
            MountOptions {
                format: false,
                spawn_workers: false,
            },
        )
    }

    #[test]
    fn write_seek_read_round_trip() {
        let (_disk, fs) = fresh_fs();
        let root = fs.root();
        fs.create(&root, "notes", 0).unwrap();
        let file = fs.open(&root, "notes").unwrap();

        let payload = b"the quick brown fox";
        file.seek(100);
        assert_eq!(file.write(payload).unwrap(), payload.len());
        assert_eq!(file.size(), 100 + payload.len());

        file.seek(100);
        let mut buf = [0u8; 19];
        assert_eq!(file.read(&mut buf).unwrap(), 19);
        assert_eq!(&buf, payload);

        // The gap before the data reads back as zeros.
        file.seek(0);
        let mut gap = [0xFFu8; 100];
        assert_eq!(file.read(&mut gap).unwrap(), 100);
        assert!(gap.iter().all(|&b| b == 0));
    }

    #[test]
    fn length_is_max_of_old_and_write_end() {
        let (_disk, fs) = fresh_fs();
        let root = fs.root();
        fs.create(&root, "f", 1000).unwrap();
        let file = fs.open(&root, "f").unwrap();
        assert_eq!(file.size(), 1000);

        // A write inside the file does not shrink it.
        file.write_at(10, b"xyz").unwrap();
        assert_eq!(file.size(), 1000);
        file.write_at(998, b"abcd").unwrap();
        assert_eq!(file.size(), 1002);
    }

    #[test]
    fn grows_across_indirect_boundaries() {
        let (_disk, fs) = fresh_fs();
        let root = fs.root();
        fs.create(&root, "big", 0).unwrap();
        let file = fs.open(&root, "big").unwrap();

        // Past the direct pointers (block 123) and into the doubly
        // indirect region (block 251).
        for &block in &[0usize, 122, 123, 200, 251, 300] {
            let offset = block * SECTOR_SIZE + 7;
            let tag = (block as u32).to_le_bytes();
            file.write_at(offset, &tag).unwrap();
        }
        for &block in &[0usize, 122, 123, 200, 251, 300] {
            let offset = block * SECTOR_SIZE + 7;
            let mut tag = [0u8; 4];
            assert_eq!(file.read_at(offset, &mut tag).unwrap(), 4);
            assert_eq!(tag, (block as u32).to_le_bytes());
        }
        assert_eq!(file.size(), 300 * SECTOR_SIZE + 7 + 4);
    }

    #[test]
    fn contents_survive_remount() {
        let (disk, fs) = fresh_fs();
        let root = fs.root();
        fs.create(&root, "keep", 0).unwrap();
        fs.open(&root, "keep").unwrap().write(b"kept bytes").unwrap();
        fs.flush();
        drop(fs);

        let fs = remount(&disk);
        let root = fs.root();
        let file = fs.open(&root, "keep").unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(file.read(&mut buf).unwrap(), 10);
        assert_eq!(&buf, b"kept bytes");
    }

    #[test]
    fn crash_after_rename_commit_recovers_new_name() {
        let (disk, fs) = fresh_fs();
        let root = fs.root();
        fs.create(&root, "a", 0).unwrap();
        let content = vec![b'A'; 4096];
        fs.open(&root, "a").unwrap().write(&content).unwrap();
        fs.rename(&root, "a", "b").unwrap();
        // Crash with the rename only in the log and the cache.
        let frozen = Arc::new(disk.snapshot());
        drop(fs);

        let fs = remount(&frozen);
        let root = fs.root();
        assert_eq!(fs.open(&root, "a").unwrap_err().error(), Errno::NotFound);
        let file = fs.open(&root, "b").unwrap();
        let mut buf = vec![0u8; 4096];
        assert_eq!(file.read(&mut buf).unwrap(), 4096);
        assert!(buf.iter().all(|&b| b == b'A'));
    }

    #[test]
    fn directories_nest_and_list() {
        let (_disk, fs) = fresh_fs();
        let root = fs.root();
        fs.mkdir(&root, "usr").unwrap();
        fs.mkdir(&root, "usr/bin").unwrap();
        fs.create(&root, "usr/bin/true", 0).unwrap();
        fs.create(&root, "usr/bin/false", 0).unwrap();

        let bin = fs.open_dir(&root, "usr/bin").unwrap();
        fs.create(&bin, "ls", 0).unwrap();

        let handle = fs.open(&root, "/usr/bin").unwrap();
        let mut names = Vec::new();
        while let Some(entry) = handle.readdir().unwrap() {
            names.push(entry.name);
        }
        names.sort();
        assert_eq!(names, ["false", "ls", "true"]);

        // Relative lookup through `..` works.
        let via_dots = fs.open(&bin, "../bin/ls").unwrap();
        assert!(!via_dots.is_dir());
    }

    #[test]
    fn mkdir_on_existing_name_fails() {
        let (_disk, fs) = fresh_fs();
        let root = fs.root();
        fs.create(&root, "x", 0).unwrap();
        assert_eq!(fs.mkdir(&root, "x").unwrap_err().error(), Errno::Exists);
        assert_eq!(fs.create(&root, "x", 0).unwrap_err().error(), Errno::Exists);
    }

    #[test]
    fn long_names_are_rejected() {
        let (_disk, fs) = fresh_fs();
        let root = fs.root();
        assert_eq!(
            fs.create(&root, "exactly14chars", 0).is_ok(),
            true,
        );
        assert_eq!(
            fs.create(&root, "fifteen-chars!!", 0).unwrap_err().error(),
            Errno::NameTooLong
        );
    }

    #[test]
    fn removed_file_lives_until_closed() {
        let (_disk, fs) = fresh_fs();
        let root = fs.root();
        fs.create(&root, "ghost", 0).unwrap();
        let file = fs.open(&root, "ghost").unwrap();
        file.write(b"boo").unwrap();

        fs.remove(&root, "ghost").unwrap();
        assert_eq!(fs.open(&root, "ghost").unwrap_err().error(), Errno::NotFound);

        // The open handle still works.
        let mut buf = [0u8; 3];
        assert_eq!(file.read_at(0, &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"boo");
    }

    #[test]
    fn nonempty_directory_is_not_removable() {
        let (_disk, fs) = fresh_fs();
        let root = fs.root();
        fs.mkdir(&root, "d").unwrap();
        fs.create(&root, "d/child", 0).unwrap();
        assert_eq!(fs.remove(&root, "d").unwrap_err().error(), Errno::NotEmpty);

        fs.remove(&root, "d/child").unwrap();
        fs.remove(&root, "d").unwrap();
        assert_eq!(fs.open_dir(&root, "d").unwrap_err().error(), Errno::NotFound);
    }

    #[test]
    fn directory_in_use_as_cwd_is_not_removable() {
        let (_disk, fs) = fresh_fs();
        let root = fs.root();
        fs.mkdir(&root, "home").unwrap();
        let cwd = fs.open_dir(&root, "home").unwrap();
        assert_eq!(fs.remove(&root, "home").unwrap_err().error(), Errno::Busy);
        drop(cwd);
        fs.remove(&root, "home").unwrap();
    }

    #[test]
    fn symlinks_resolve_and_read_back() {
        let (_disk, fs) = fresh_fs();
        let root = fs.root();
        fs.mkdir(&root, "data").unwrap();
        fs.create(&root, "data/real", 0).unwrap();
        fs.open(&root, "data/real").unwrap().write(b"payload").unwrap();

        fs.symlink(&root, "/data/real", "alias").unwrap();
        assert_eq!(fs.readlink(&root, "alias").unwrap(), "/data/real");

        let file = fs.open(&root, "alias").unwrap();
        let mut buf = [0u8; 7];
        assert_eq!(file.read(&mut buf).unwrap(), 7);
        assert_eq!(&buf, b"payload");

        // A symlink in the middle of a path expands too.
        fs.symlink(&root, "data", "d").unwrap();
        let via_middle = fs.open(&root, "d/real").unwrap();
        assert_eq!(via_middle.size(), 7);
    }

    #[test]
    fn symlink_chain_of_eight_resolves_nine_fails() {
        let (_disk, fs) = fresh_fs();
        let root = fs.root();
        fs.create(&root, "end", 0).unwrap();
        fs.symlink(&root, "end", "l1").unwrap();
        for i in 2..=9 {
            let target = alloc::format!("l{}", i - 1);
            let link = alloc::format!("l{}", i);
            fs.symlink(&root, &target, &link).unwrap();
        }
        // l8 → ... → l1 → end: eight expansions, within the budget.
        assert!(fs.open(&root, "l8").is_ok());
        // l9 needs nine.
        assert_eq!(
            fs.open(&root, "l9").unwrap_err().error(),
            Errno::SymlinkLoop
        );
    }

    #[test]
    fn symlink_cycle_errors_out() {
        let (_disk, fs) = fresh_fs();
        let root = fs.root();
        fs.symlink(&root, "tick", "tock").unwrap();
        fs.symlink(&root, "tock", "tick").unwrap();
        assert_eq!(
            fs.open(&root, "tick").unwrap_err().error(),
            Errno::SymlinkLoop
        );
    }

    #[test]
    fn remove_frees_sectors_for_reuse() {
        let (_disk, fs) = fresh_fs();
        let root = fs.root();
        // Fill most of the disk, remove it, and fill again; the second
        // pass only fits if removal returned the sectors.
        let blob = vec![0x5Au8; 2200 * SECTOR_SIZE];
        for round in 0..2 {
            let name = alloc::format!("blob{}", round);
            fs.create(&root, &name, 0).unwrap();
            let file = fs.open(&root, &name).unwrap();
            assert_eq!(file.write(&blob).unwrap(), blob.len());
            drop(file);
            fs.remove(&root, &name).unwrap();
        }
    }
}

