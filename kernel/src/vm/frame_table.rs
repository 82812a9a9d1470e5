//! The physical frame table.
//!
//! One entry per user-pool frame in use: who owns it (process and user
//! page) and whether it is pinned against eviction. When the user pool
//! runs dry, the second-chance clock sweeps the entries, consuming the
//! page directories' accessed bits, and asks the victim's supplemental
//! page table to save the contents.
//!
//! Lock order: a supplemental page table's lock may be held when taking
//! the table lock, never the other way around; the sweep reads only
//! hardware bits and the pin flags, both reachable from here.

use osprey_frame::vm::{self, Pool, VmFrame};

use crate::prelude::*;
use crate::process::Process;

struct FrameEntry {
    paddr: Paddr,
    owner: Weak<Process>,
    upage: Vaddr,
    pinned: bool,
}

struct FrameTableInner {
    entries: Vec<FrameEntry>,
    hand: usize,
}

lazy_static! {
    static ref FRAME_TABLE: Mutex<FrameTableInner> = Mutex::new(FrameTableInner {
        entries: Vec::new(),
        hand: 0,
    });
}

/// Allocates a user frame for (`owner`, `upage`), evicting if needed.
/// The new entry starts pinned; the caller unpins once the page is
/// installed.
pub fn alloc_user_frame(owner: &Arc<Process>, upage: Vaddr) -> Result<VmFrame> {
    loop {
        if let Some(frame) = vm::alloc_frame(Pool::User) {
            let mut table = FRAME_TABLE.lock();
            table.entries.push(FrameEntry {
                paddr: frame.paddr(),
                owner: Arc::downgrade(owner),
                upage,
                pinned: true,
            });
            return Ok(frame);
        }
        evict_one()?;
    }
}

/// Second-chance selection and eviction of one frame.
fn evict_one() -> Result<()> {
    let (victim_process, victim_upage) = {
        let mut table = FRAME_TABLE.lock();
        let len = table.entries.len();
        if len == 0 {
            return_errno_with_message!(Errno::ENOMEM, "user pool empty with no frames to evict");
        }
        let mut chosen = None;
        // Two sweeps: the first clears reference bits, the second must
        // find something unless everything is pinned.
        for _ in 0..2 * len {
            let idx = table.hand % table.entries.len();
            table.hand = (table.hand + 1) % table.entries.len();
            let entry = &table.entries[idx];
            if entry.pinned {
                continue;
            }
            let Some(process) = entry.owner.upgrade() else {
                // Orphaned by a dying process; its teardown will drop
                // the frame shortly. Skip.
                continue;
            };
            if process.page_dir().test_and_clear_accessed(entry.upage) {
                continue;
            }
            let entry = &mut table.entries[idx];
            entry.pinned = true;
            chosen = Some((process, entry.upage));
            break;
        }
        match chosen {
            Some(found) => found,
            None => {
                return_errno_with_message!(Errno::ENOMEM, "every user frame is pinned")
            }
        }
    };

    // Table lock released: the victim is pinned, so the save (which
    // may write swap or a file) runs without blocking other allocators.
    victim_process.spt().evict_prepare(&victim_process, victim_upage);
    Ok(())
}

/// Drops the entry for `paddr`. Called by the owner right before it
/// frees or repurposes the frame.
pub fn unregister(paddr: Paddr) {
    let mut table = FRAME_TABLE.lock();
    table.entries.retain(|entry| entry.paddr != paddr);
}

pub fn pin(paddr: Paddr) {
    set_pinned(paddr, true);
}

pub fn unpin(paddr: Paddr) {
    set_pinned(paddr, false);
}

fn set_pinned(paddr: Paddr, pinned: bool) {
    let mut table = FRAME_TABLE.lock();
    if let Some(entry) = table.entries.iter_mut().find(|entry| entry.paddr == paddr) {
        entry.pinned = pinned;
    }
}

/// Entry count, for the accounting checks in tests and panics.
pub fn frames_in_use() -> usize {
    FRAME_TABLE.lock().entries.len()
}
