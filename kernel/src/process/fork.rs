//! `fork`: an eager duplicate of the calling process.
//!
//! Every parent page is materialised and copied into a fresh child
//! frame (no copy-on-write; correctness first, see DESIGN.md). The
//! descriptor table is cloned with shared open-file handles, the mmap
//! table is cloned entry for entry, and the child's first thread
//! resumes at the call boundary with EAX = 0.

use core::sync::atomic::Ordering;

use osprey_frame::cpu::UserContext;
use osprey_frame::task::TaskOptions;

use crate::prelude::*;
use crate::process::{user_loop, Pid, Process, PROCESS_TABLE};
use crate::thread::ThreadCtx;

pub fn fork(parent: &Arc<Process>, parent_ctx: &UserContext) -> Result<Pid> {
    let child = Process::new(parent.name().to_string(), parent.cwd())?;

    // Files: shared handles, shared offsets; the executable stays
    // write-denied through the child's copy too.
    *child.fds.lock() = parent.fds.lock().duplicate();
    let executable = parent.executable.lock().clone();
    if let Some(executable) = executable {
        child.set_executable(executable);
    }

    // Address space, eagerly.
    parent.spt().fork_copy_into(parent, &child)?;
    {
        let parent_mmaps = parent.mmaps().lock();
        *child.mmaps().lock() = parent_mmaps.duplicate();
    }

    PROCESS_TABLE.lock().insert(child.pid(), child.clone());
    parent
        .children
        .lock()
        .insert(child.pid(), child.record().clone());

    // The child returns 0 from the same call site.
    let mut child_ctx = *parent_ctx;
    child_ctx.eax = 0;

    let entry_child = child.clone();
    let task = TaskOptions::new(move || {
        let child = entry_child;
        let mut ctx = child_ctx;
        user_loop(&child, &mut ctx);
    })
    .name(parent.name())
    .data(ThreadCtx::new(Arc::downgrade(&child)))
    .spawn()?;
    child.add_thread(task);

    // Fork has no load step; the handshake record is born satisfied.
    child.record().load_ok.store(true, Ordering::Relaxed);
    child.record().load_done.up();

    Ok(child.pid())
}
