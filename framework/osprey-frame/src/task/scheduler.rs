//! The scheduler seam.
//!
//! The frame owns the mechanism (switching, blocking, the ready-queue
//! calls); the policy is a trait object installed once at boot. The
//! kernel services provide the interesting policies (strict priority
//! with donation, MLFQS); the frame ships a FIFO fallback so the boot
//! path can run before any policy is chosen.

use alloc::collections::VecDeque;

use crate::prelude::*;
use crate::sync::SpinLock;
use crate::task::Task;

/// A scheduling policy over ready tasks.
pub trait Scheduler: Sync + Send {
    /// Adds a ready task.
    fn activate(&self, task: Arc<Task>);

    /// Removes and returns the next task to run.
    fn fetch_next(&self) -> Option<Arc<Task>>;

    /// Whether some ready task outranks `current`.
    fn should_preempt(&self, current: &Arc<Task>) -> bool;

    /// A timer tick elapsed, charged to `current`.
    fn tick(&self, current: Option<&Arc<Task>>, now: u64);

    /// Ready-task count (the idle task is never queued).
    fn ready_count(&self) -> usize;
}

pub(crate) struct GlobalScheduler {
    scheduler: Option<&'static dyn Scheduler>,
}

pub(crate) static GLOBAL_SCHEDULER: SpinLock<GlobalScheduler> =
    SpinLock::new(GlobalScheduler { scheduler: None });

static FIFO_FALLBACK: FifoScheduler = FifoScheduler::new();

/// Sets the global task scheduler. Must happen before the policy's
/// semantics matter; switching policies mid-flight is not supported.
pub fn set_scheduler(scheduler: &'static dyn Scheduler) {
    GLOBAL_SCHEDULER.lock_irq_disabled().scheduler = Some(scheduler);
}

fn with<R>(f: impl FnOnce(&'static dyn Scheduler) -> R) -> R {
    let scheduler = GLOBAL_SCHEDULER
        .lock_irq_disabled()
        .scheduler
        .unwrap_or(&FIFO_FALLBACK);
    f(scheduler)
}

pub(crate) fn fetch_task() -> Option<Arc<Task>> {
    with(|s| s.fetch_next())
}

pub(crate) fn enqueue_task(task: Arc<Task>) {
    with(|s| s.activate(task));
}

pub(crate) fn should_preempt(current: &Arc<Task>) -> bool {
    with(|s| s.should_preempt(current))
}

pub(crate) fn scheduler_tick(current: Option<&Arc<Task>>, now: u64) {
    with(|s| s.tick(current, now));
}

pub fn ready_count() -> usize {
    with(|s| s.ready_count())
}

/// Round-robin in arrival order, ignoring priorities.
pub struct FifoScheduler {
    queue: SpinLock<VecDeque<Arc<Task>>>,
}

impl FifoScheduler {
    pub const fn new() -> Self {
        Self {
            queue: SpinLock::new(VecDeque::new()),
        }
    }
}

impl Default for FifoScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for FifoScheduler {
    fn activate(&self, task: Arc<Task>) {
        self.queue.lock_irq_disabled().push_back(task);
    }

    fn fetch_next(&self) -> Option<Arc<Task>> {
        self.queue.lock_irq_disabled().pop_front()
    }

    fn should_preempt(&self, _current: &Arc<Task>) -> bool {
        false
    }

    fn tick(&self, _current: Option<&Arc<Task>>, _now: u64) {}

    fn ready_count(&self) -> usize {
        self.queue.lock_irq_disabled().len()
    }
}
