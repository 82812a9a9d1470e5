//! Tasks: creation, the all-tasks table, scheduling entry points.

mod priority;
mod processor;
mod scheduler;
#[allow(clippy::module_inception)]
mod task;

use alloc::collections::BTreeMap;

use crate::prelude::*;
use crate::sync::SpinLock;

pub use priority::{Priority, PRI_DEFAULT, PRI_MAX, PRI_MIN};
pub use processor::{
    block_current, current_priority, current_task, exit_current, preempt, set_switch_hook,
    unblock, yield_now, DisablePreemptGuard,
};
pub(crate) use processor::{
    current_kernel_stack_top, install_boot_and_idle, is_preemptible, preempt_on_irq_return,
    reap_dying, schedule,
};
pub use scheduler::{ready_count, set_scheduler, FifoScheduler, Scheduler};
pub(crate) use scheduler::{enqueue_task, scheduler_tick};
pub use task::{Task, TaskAdapter, TaskOptions, TaskStatus, Tid};

/// The all-tasks set, keyed by tid.
static TASK_TABLE: SpinLock<BTreeMap<Tid, Arc<Task>>> = SpinLock::new(BTreeMap::new());

pub(crate) fn register_task(task: &Arc<Task>) {
    TASK_TABLE
        .lock_irq_disabled()
        .insert(task.tid(), task.clone());
}

pub(crate) fn unregister_task(tid: Tid) {
    TASK_TABLE.lock_irq_disabled().remove(&tid);
}

/// Looks a task up by id.
pub fn task_by_tid(tid: Tid) -> Option<Arc<Task>> {
    TASK_TABLE.lock_irq_disabled().get(&tid).cloned()
}

/// Visits every live task; the MLFQS recomputations drive this.
pub fn for_each_task(mut f: impl FnMut(&Arc<Task>)) {
    let table = TASK_TABLE.lock_irq_disabled();
    for task in table.values() {
        f(task);
    }
}

/// Puts a ready task in the scheduler's hands, preempting if it
/// outranks the caller.
pub(crate) fn activate(task: Arc<Task>) {
    let outranks = task.effective_priority() > current_priority();
    enqueue_task(task);
    if outranks && is_preemptible() && !crate::trap::in_interrupt() {
        yield_now();
    }
}

/// Every spawned task starts here after its first context switch.
pub(crate) extern "C" fn kernel_task_entry() -> ! {
    // The switch that got us here never returned to `switch_to`; do
    // its bookkeeping, then open interrupts for the first time.
    reap_dying();
    unsafe { crate::arch::irq::enable_local() };

    let func = current_task()
        .expect("no current task in the task trampoline")
        .take_func()
        .expect("task body already taken");
    func();
    exit_current();
}

/// Turns the boot flow of control into the "main" task and parks an
/// idle task next to it. Called once from `crate::init`.
pub(crate) fn init() {
    let boot = task::adopt_boot_task();
    let idle = TaskOptions::new(idle_loop)
        .name("idle")
        .priority(Priority::new(PRI_MIN))
        .idle()
        .build()
        .expect("building the idle task failed");
    install_boot_and_idle(boot, idle);
}

fn idle_loop() {
    loop {
        crate::arch::halt();
        // An interrupt woke something up; give it the CPU.
        yield_now();
    }
}
