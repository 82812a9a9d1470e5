//! The kernel-side thread context.
//!
//! Every task that belongs to a process carries a [`ThreadCtx`] as its
//! task payload: the back-pointer to the process, the exit semaphore
//! `pt_join` waits on, and the user stack pointer saved at the last
//! trap, which the page-fault path consults for stack growth.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use osprey_frame::task::Task;

use crate::prelude::*;
use crate::process::Process;

pub struct ThreadCtx {
    pub process: Weak<Process>,
    /// Upped exactly once, when the thread exits.
    pub exit_sema: Semaphore,
    pub joined: AtomicBool,
    /// The user ESP at the most recent trap into the kernel.
    pub user_esp: AtomicUsize,
}

impl ThreadCtx {
    pub fn new(process: Weak<Process>) -> Self {
        ThreadCtx {
            process,
            exit_sema: Semaphore::new(0),
            joined: AtomicBool::new(false),
            user_esp: AtomicUsize::new(0),
        }
    }

    pub fn set_user_esp(&self, esp: usize) {
        self.user_esp.store(esp, Ordering::Relaxed);
    }

    pub fn user_esp(&self) -> usize {
        self.user_esp.load(Ordering::Relaxed)
    }
}

/// The calling task, if it belongs to a process.
pub fn current_ctx() -> Option<Arc<Task>> {
    let task = osprey_frame::task::current_task()?;
    ctx_of(&task).is_some().then_some(task)
}

/// Convenience: the `ThreadCtx` of a task, if it has one.
pub fn ctx_of(task: &Arc<Task>) -> Option<&ThreadCtx> {
    task.data().downcast_ref::<ThreadCtx>()
}
