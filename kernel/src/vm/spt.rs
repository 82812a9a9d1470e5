//! The supplemental page table.
//!
//! Per process, a map from user page to where its contents live: not
//! yet anywhere (zero-fill), in a file at some offset, in a swap slot,
//! or in a physical frame. The fault handler drives `load`; eviction
//! drives `evict_prepare`; exec and mmap install entries up front and
//! nothing is read until the first touch.

use align_ext::AlignExt;
use hashbrown::HashMap;
use osprey_frame::vm::VmFrame;
use osprey_jfs::FileHandle;

use crate::prelude::*;
use crate::process::Process;
use crate::vm::{frame_table, swap};

/// What to do with a materialised page when it is evicted or unmapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritebackPolicy {
    /// Read-only image pages: drop, reload from the file.
    Never,
    /// Memory-mapped file pages: dirty contents go back to the file.
    MmapBack,
    /// Private writable file pages: once dirtied they live in swap.
    SwapOnDirty,
}

/// The file a page's initial contents come from.
#[derive(Clone)]
pub struct FileOrigin {
    pub file: Arc<FileHandle>,
    pub offset: usize,
    /// Bytes read from the file; the tail of the page is zeros.
    pub read_bytes: usize,
    pub policy: WritebackPolicy,
}

enum PageState {
    /// First touch gets a zeroed frame.
    Zero,
    /// Contents come from `origin` on first touch.
    File,
    /// Contents were evicted to this swap slot.
    Swap(swap::SwapSlot),
    /// Live in memory; the entry owns the frame.
    Frame(VmFrame),
}

struct SptEntry {
    writable: bool,
    pinned: bool,
    /// Set once the page has ever been dirty; such a page can no
    /// longer be dropped and reloaded from its file.
    ever_dirty: bool,
    state: PageState,
    origin: Option<FileOrigin>,
}

/// A process's supplemental page table.
pub struct Spt {
    map: Mutex<HashMap<Vaddr, SptEntry>>,
}

impl Spt {
    pub fn new() -> Self {
        Spt {
            map: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a zero-filled page.
    pub fn install_zero(&self, upage: Vaddr, writable: bool) -> Result<()> {
        self.install(
            upage,
            SptEntry {
                writable,
                pinned: false,
                ever_dirty: false,
                state: PageState::Zero,
                origin: None,
            },
        )
    }

    /// Registers a file-backed page.
    pub fn install_file(&self, upage: Vaddr, origin: FileOrigin, writable: bool) -> Result<()> {
        self.install(
            upage,
            SptEntry {
                writable,
                pinned: false,
                ever_dirty: false,
                state: PageState::File,
                origin: Some(origin),
            },
        )
    }

    fn install(&self, upage: Vaddr, entry: SptEntry) -> Result<()> {
        debug_assert_eq!(upage % PAGE_SIZE, 0);
        let mut map = self.map.lock();
        if map.contains_key(&upage) {
            return_errno_with_message!(Errno::EINVAL, "page already has a backing");
        }
        map.insert(upage, entry);
        Ok(())
    }

    /// Whether any page in `[addr, addr + len)` already has an entry.
    pub fn range_is_free(&self, addr: Vaddr, len: usize) -> bool {
        let map = self.map.lock();
        let mut page = addr.align_down(PAGE_SIZE);
        while page < addr + len {
            if map.contains_key(&page) {
                return false;
            }
            page += PAGE_SIZE;
        }
        true
    }

    pub fn contains(&self, upage: Vaddr) -> bool {
        self.map.lock().contains_key(&upage)
    }

    /// Whether a fault at (`upage`, write?) is satisfiable by loading.
    pub fn fault_is_loadable(&self, upage: Vaddr, write: bool) -> bool {
        let map = self.map.lock();
        match map.get(&upage) {
            Some(entry) => entry.writable || !write,
            None => false,
        }
    }

    /// Materialises `upage`: allocate a frame (possibly evicting), fill
    /// it per the entry's state, install the MMU mapping.
    pub fn load(&self, process: &Arc<Process>, upage: Vaddr) -> Result<()> {
        // Snapshot what to do and pin the entry so eviction of this
        // very page cannot interleave; the frame allocation below may
        // block and evict other pages.
        enum FillPlan {
            Zero,
            File(FileOrigin),
            Swap(swap::SwapSlot),
        }
        let plan = loop {
            let mut map = self.map.lock();
            let entry = map
                .get_mut(&upage)
                .ok_or(Error::with_message(Errno::EFAULT, "no backing for page"))?;
            if entry.pinned {
                // Another thread is mid-load on this page; let it win.
                drop(map);
                osprey_frame::task::yield_now();
                continue;
            }
            let plan = match entry.state {
                PageState::Frame(_) => return Ok(()), // raced another fault
                PageState::Zero => FillPlan::Zero,
                PageState::File => {
                    FillPlan::File(entry.origin.clone().expect("file state without origin"))
                }
                PageState::Swap(slot) => FillPlan::Swap(slot),
            };
            entry.pinned = true;
            break plan;
        };

        let fill = || -> Result<VmFrame> {
            let frame = frame_table::alloc_user_frame(process, upage)?;
            match plan {
                FillPlan::Zero => frame.zero(),
                FillPlan::File(origin) => {
                    frame.zero();
                    let mut buf = vec![0u8; origin.read_bytes];
                    let got = origin.file.read_at(origin.offset, &mut buf)?;
                    frame.copy_from_slice(0, &buf[..got]);
                }
                FillPlan::Swap(slot) => swap::swap_in(slot, &frame),
            }
            Ok(frame)
        };
        let frame = match fill() {
            Ok(frame) => frame,
            Err(err) => {
                if let Some(entry) = self.map.lock().get_mut(&upage) {
                    entry.pinned = false;
                }
                return Err(err);
            }
        };

        let mut map = self.map.lock();
        let entry = map.get_mut(&upage).expect("entry vanished during load");
        let paddr = frame.paddr();
        process.page_dir().map(upage, paddr, entry.writable)?;
        entry.state = PageState::Frame(frame);
        entry.pinned = false;
        drop(map);
        frame_table::unpin(paddr);
        Ok(())
    }

    /// Pins a materialised page against eviction.
    pub fn pin(&self, upage: Vaddr) {
        let mut map = self.map.lock();
        if let Some(entry) = map.get_mut(&upage) {
            entry.pinned = true;
            if let PageState::Frame(ref frame) = entry.state {
                frame_table::pin(frame.paddr());
            }
        }
    }

    pub fn unpin(&self, upage: Vaddr) {
        let mut map = self.map.lock();
        if let Some(entry) = map.get_mut(&upage) {
            entry.pinned = false;
            if let PageState::Frame(ref frame) = entry.state {
                frame_table::unpin(frame.paddr());
            }
        }
    }

    /// Saves `upage` ahead of eviction and releases its frame. Called
    /// by the frame table with the frame pinned on its side.
    pub fn evict_prepare(&self, process: &Arc<Process>, upage: Vaddr) {
        let mut map = self.map.lock();
        let Some(entry) = map.get_mut(&upage) else {
            return; // torn down while we were choosing it
        };
        if entry.pinned {
            return;
        }
        let PageState::Frame(ref frame) = entry.state else {
            return;
        };

        let pd = process.page_dir();
        let dirty = pd.is_dirty(upage);
        pd.unmap(upage);

        let policy = entry
            .origin
            .as_ref()
            .map(|o| o.policy)
            .unwrap_or(WritebackPolicy::SwapOnDirty);

        let next = if policy == WritebackPolicy::MmapBack {
            if dirty {
                let origin = entry.origin.as_ref().unwrap();
                write_back_to_file(frame, origin);
            }
            PageState::File
        } else if entry.writable && (entry.origin.is_none() || dirty || entry.ever_dirty) {
            match swap::swap_out(frame) {
                Ok(slot) => PageState::Swap(slot),
                Err(_) => {
                    // Out of swap: keep the page resident; the caller
                    // will pick another victim or give up.
                    pd.map(upage, frame.paddr(), entry.writable)
                        .expect("remapping an evicted page failed");
                    return;
                }
            }
        } else {
            // Clean file-backed (or read-only) contents: reloadable.
            PageState::File
        };

        if dirty {
            entry.ever_dirty = true;
        }
        let old = core::mem::replace(&mut entry.state, next);
        if let PageState::Frame(frame) = old {
            frame_table::unregister(frame.paddr());
            drop(frame);
        }
    }

    /// Tears down every page: mappings, frames, swap slots. Dirty mmap
    /// pages must have been written back already (`mmap::munmap_all`).
    pub fn destroy_all(&self, process: &Process) {
        let mut map = self.map.lock();
        for (upage, entry) in map.drain() {
            match entry.state {
                PageState::Frame(frame) => {
                    process.page_dir().unmap(upage);
                    frame_table::unregister(frame.paddr());
                }
                PageState::Swap(slot) => swap::free_slot(slot),
                _ => {}
            }
        }
    }

    /// Removes one mmap page, writing dirty contents back. `live` is
    /// how many bytes of the page the mapping actually covers.
    pub(crate) fn remove_mmap_page(&self, process: &Process, upage: Vaddr) -> Result<()> {
        let mut map = self.map.lock();
        let Some(entry) = map.remove(&upage) else {
            return Ok(());
        };
        if let PageState::Frame(frame) = entry.state {
            let pd = process.page_dir();
            let dirty = pd.is_dirty(upage);
            pd.unmap(upage);
            if dirty {
                let origin = entry.origin.as_ref().expect("mmap page without origin");
                write_back_to_file(&frame, origin);
            }
            frame_table::unregister(frame.paddr());
        }
        Ok(())
    }

    /// Visits every entry's page address; fork walks this.
    pub fn pages(&self) -> Vec<Vaddr> {
        self.map.lock().keys().copied().collect()
    }

    /// Clones the origin and writability of `upage` for fork.
    pub(crate) fn entry_meta(&self, upage: Vaddr) -> Option<(bool, Option<FileOrigin>)> {
        let map = self.map.lock();
        map.get(&upage)
            .map(|entry| (entry.writable, entry.origin.clone()))
    }

    /// Eagerly duplicates every page of this (the parent's) table into
    /// `child`: materialise, copy the frame, map it in the child.
    pub fn fork_copy_into(&self, parent: &Arc<Process>, child: &Arc<Process>) -> Result<()> {
        for upage in self.pages() {
            loop {
                self.load(parent, upage)?;
                let Some((writable, origin)) = self.entry_meta(upage) else {
                    // The page went away mid-fork (a racing munmap);
                    // the child simply does not get it.
                    break;
                };

                let child_frame = frame_table::alloc_user_frame(child, upage)?;
                let copied = {
                    let map = self.map.lock();
                    match map.get(&upage).map(|entry| &entry.state) {
                        Some(PageState::Frame(parent_frame)) => {
                            child_frame.copy_from_frame(parent_frame);
                            true
                        }
                        // Evicted between load and copy; try again.
                        _ => false,
                    }
                };
                if !copied {
                    frame_table::unregister(child_frame.paddr());
                    continue;
                }
                child.spt().adopt_frame(child, upage, writable, origin, child_frame)?;
                break;
            }
        }
        Ok(())
    }

    /// Installs an already-filled frame (fork's copies).
    fn adopt_frame(
        &self,
        owner: &Arc<Process>,
        upage: Vaddr,
        writable: bool,
        origin: Option<FileOrigin>,
        frame: VmFrame,
    ) -> Result<()> {
        let paddr = frame.paddr();
        owner.page_dir().map(upage, paddr, writable)?;
        let entry = SptEntry {
            writable,
            pinned: false,
            // The copied bytes may already differ from the file, so
            // this page must never be dropped-and-reloaded.
            ever_dirty: origin
                .as_ref()
                .map_or(true, |o| o.policy == WritebackPolicy::SwapOnDirty),
            state: PageState::Frame(frame),
            origin,
        };
        self.install(upage, entry)?;
        frame_table::unpin(paddr);
        Ok(())
    }
}

impl Default for Spt {
    fn default() -> Self {
        Self::new()
    }
}

fn write_back_to_file(frame: &VmFrame, origin: &FileOrigin) {
    let mut buf = vec![0u8; origin.read_bytes];
    frame.copy_to_slice(0, &mut buf);
    if let Err(err) = origin.file.write_at(origin.offset, &buf) {
        error!("mmap write-back at offset {} failed: {:?}", origin.offset, err);
    }
}
