//! Scheduling policies, installed into the frame's scheduler seam.
//!
//! Two interesting policies: strict priority (the donation machinery in
//! the frame's mutexes feeds the effective priorities this policy
//! picks by) and the multi-level feedback queue, which recomputes
//! priorities from `recent_cpu` and `nice` and ignores donation. FIFO
//! comes from the frame itself.

mod mlfqs;
mod priority;

use osprey_frame::boot::SchedulerKind;
use osprey_frame::task::{self, Task};

use crate::prelude::*;

pub use mlfqs::MlfqsScheduler;
pub use priority::PriorityScheduler;

static MLFQS_ACTIVE: spin::Once<bool> = spin::Once::new();

/// Installs the policy chosen on the kernel command line. Called once,
/// before any secondary thread exists.
pub fn init(kind: SchedulerKind) {
    let mlfqs = matches!(kind, SchedulerKind::Mlfqs);
    MLFQS_ACTIVE.call_once(|| mlfqs);
    match kind {
        SchedulerKind::Fifo => {
            // The frame's built-in fallback is already FIFO; install an
            // explicit instance so the choice is visible.
            task::set_scheduler(Box::leak(Box::new(task::FifoScheduler::new())));
        }
        SchedulerKind::Priority => {
            task::set_scheduler(Box::leak(Box::new(PriorityScheduler::new())));
        }
        SchedulerKind::Mlfqs => {
            task::set_scheduler(Box::leak(Box::new(MlfqsScheduler::new())));
        }
    }
    info!("sched: policy {:?}", kind);
}

pub fn mlfqs_active() -> bool {
    *MLFQS_ACTIVE.get().unwrap_or(&false)
}

/// Sets a thread's base priority. A no-op under MLFQS, which owns every
/// priority itself.
pub fn set_thread_priority(task: &Arc<Task>, priority: task::Priority) {
    if mlfqs_active() {
        return;
    }
    task.set_priority(priority);
    // Dropping our own priority may mean someone else should run.
    task::preempt();
}
