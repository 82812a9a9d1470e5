//! Memory-mapped files.
//!
//! Each process keeps a table of its live mappings. Mapping installs
//! one file-backed SPT entry per page with the mmap write-back policy;
//! nothing is read until a page faults. Unmapping writes dirty
//! materialised pages back to the file (only up to the file size
//! recorded at map time) and drops the entries.

use osprey_jfs::FileHandle;

use crate::prelude::*;
use crate::process::Process;
use crate::vm::spt::{FileOrigin, WritebackPolicy};

pub type Mid = u32;

struct Mapping {
    addr: Vaddr,
    /// The file length at map time; writes beyond it are not synced.
    len: usize,
    file: Arc<FileHandle>,
}

pub struct MmapTable {
    map: BTreeMap<Mid, Mapping>,
    next: Mid,
}

impl MmapTable {
    pub fn new() -> Self {
        MmapTable {
            map: BTreeMap::new(),
            next: 1,
        }
    }
}

impl Default for MmapTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MmapTable {
    /// A structural copy for fork; the mapped pages themselves were
    /// already duplicated through the supplemental page table.
    pub fn duplicate(&self) -> MmapTable {
        MmapTable {
            map: self
                .map
                .iter()
                .map(|(&mid, mapping)| {
                    (
                        mid,
                        Mapping {
                            addr: mapping.addr,
                            len: mapping.len,
                            file: mapping.file.clone(),
                        },
                    )
                })
                .collect(),
            next: self.next,
        }
    }
}

/// Maps `file` at `addr`, returning the mapping id.
pub fn mmap(process: &Arc<Process>, file: Arc<FileHandle>, addr: Vaddr) -> Result<Mid> {
    if addr == 0 || addr % PAGE_SIZE != 0 {
        return_errno_with_message!(Errno::EINVAL, "mapping address must be page-aligned");
    }
    if file.is_dir() {
        return_errno!(Errno::EISDIR);
    }
    let len = file.size();
    if len == 0 {
        return_errno_with_message!(Errno::EINVAL, "cannot map an empty file");
    }
    if addr.checked_add(len).is_none() || addr + len > osprey_frame::config::KERNEL_OFFSET {
        return_errno!(Errno::EINVAL);
    }
    if !process.spt().range_is_free(addr, len) {
        return_errno_with_message!(Errno::EINVAL, "mapping overlaps existing pages");
    }

    let pages = len.div_ceil(PAGE_SIZE);
    for i in 0..pages {
        let offset = i * PAGE_SIZE;
        let origin = FileOrigin {
            file: file.clone(),
            offset,
            read_bytes: (len - offset).min(PAGE_SIZE),
            policy: WritebackPolicy::MmapBack,
        };
        process.spt().install_file(addr + offset, origin, true)?;
    }

    let mut table = process.mmaps().lock();
    let mid = table.next;
    table.next += 1;
    table.map.insert(mid, Mapping { addr, len, file });
    Ok(mid)
}

/// Unmaps mapping `mid`, syncing dirty pages.
pub fn munmap(process: &Arc<Process>, mid: Mid) -> Result<()> {
    let mapping = {
        let mut table = process.mmaps().lock();
        table
            .map
            .remove(&mid)
            .ok_or(Error::with_message(Errno::EINVAL, "no such mapping"))?
    };
    let pages = mapping.len.div_ceil(PAGE_SIZE);
    for i in 0..pages {
        process
            .spt()
            .remove_mmap_page(process, mapping.addr + i * PAGE_SIZE)?;
    }
    Ok(())
}

/// Unmaps everything; the exit path runs this before tearing the
/// address space down.
pub fn munmap_all(process: &Arc<Process>) {
    let mids: Vec<Mid> = process.mmaps().lock().map.keys().copied().collect();
    for mid in mids {
        let _ = munmap(process, mid);
    }
}
