//! The running-task slot and the context switch choreography.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::arch::context::{context_switch, TaskContext};
use crate::arch::segment;
use crate::prelude::*;
use crate::sync::SpinLock;
use crate::task::scheduler::{fetch_task, should_preempt};
use crate::task::task::{Task, TaskStatus};
use crate::trap;

struct Processor {
    current: Option<Arc<Task>>,
    idle: Option<Arc<Task>>,
    /// Where a never-resumed context (an exiting task) is saved to.
    scratch_ctx: TaskContext,
}

static PROCESSOR: SpinLock<Processor> = SpinLock::new(Processor {
    current: None,
    idle: None,
    scratch_ctx: TaskContext {
        regs: crate::arch::context::CalleeRegs {
            esp: 0,
            ebx: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
        },
    },
});

/// The previously running task, parked here until the thread that
/// switched in reaps it.
static PREV_DYING: SpinLock<Option<Arc<Task>>> = SpinLock::new(None);

/// Runs on every switch, with the incoming task, interrupts disabled.
/// The kernel services install the address-space switch here.
static SWITCH_HOOK: spin::Once<fn(&Arc<Task>)> = spin::Once::new();

/// Registers the per-switch hook. One registration, at kernel init.
pub fn set_switch_hook(hook: fn(&Arc<Task>)) {
    SWITCH_HOOK.call_once(|| hook);
}

static PREEMPT_COUNT: AtomicUsize = AtomicUsize::new(0);

/// While alive, the scheduler will not switch away involuntarily.
pub struct DisablePreemptGuard {
    _private: (),
}

impl DisablePreemptGuard {
    pub fn new() -> Self {
        PREEMPT_COUNT.fetch_add(1, Ordering::Relaxed);
        Self { _private: () }
    }
}

impl Default for DisablePreemptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DisablePreemptGuard {
    fn drop(&mut self) {
        PREEMPT_COUNT.fetch_sub(1, Ordering::Relaxed);
    }
}

impl !Send for DisablePreemptGuard {}

pub(crate) fn is_preemptible() -> bool {
    PREEMPT_COUNT.load(Ordering::Relaxed) == 0
}

/// Gets the current task, `None` only before `task::init`.
pub fn current_task() -> Option<Arc<Task>> {
    PROCESSOR.lock_irq_disabled().current.clone()
}

/// The running task's effective priority (0 before tasking is up).
pub fn current_priority() -> u32 {
    current_task().map(|t| t.effective_priority()).unwrap_or(0)
}

pub(crate) fn current_kernel_stack_top() -> usize {
    current_task()
        .expect("no current task")
        .kstack_top()
}

pub(crate) fn install_boot_and_idle(boot: Arc<Task>, idle: Arc<Task>) {
    let mut processor = PROCESSOR.lock_irq_disabled();
    processor.current = Some(boot);
    processor.idle = Some(idle);
}

/// Yields the CPU, staying ready.
pub fn yield_now() {
    let _irq = trap::disable_local();
    if let Some(current) = current_task() {
        if !current.is_idle() {
            current.set_status(TaskStatus::Ready);
            super::scheduler::enqueue_task(current);
        }
    }
    schedule();
}

/// Picks the next task and switches to it. The caller has already
/// parked the current task (ready queue, a waiter list, the sleep
/// queue, the dying slot) or left it running to be re-picked.
pub(crate) fn schedule() {
    debug_assert!(
        is_preemptible(),
        "schedule() while holding a spin lock"
    );
    let _irq = trap::disable_local();
    let next = {
        let processor = PROCESSOR.lock();
        match fetch_task() {
            Some(task) => task,
            None => {
                match processor.current {
                    // Nothing ready and the current task keeps running
                    // (it did not block): stay put.
                    Some(ref current)
                        if current.status() == TaskStatus::Running && !current.is_idle() =>
                    {
                        return;
                    }
                    _ => {}
                }
                processor.idle.clone().expect("no idle task")
            }
        }
    };
    switch_to(next);
}

/// Reschedules after an external interrupt if the handler asked for it.
pub(crate) fn preempt_on_irq_return() {
    if !trap::take_yield_on_return() {
        return;
    }
    if !is_preemptible() {
        // Re-arm; the next opportunity takes it.
        trap::set_yield_on_return();
        return;
    }
    yield_now();
}

/// Voluntarily gives way if the policy says someone outranks us.
pub fn preempt() {
    let _irq = trap::disable_local();
    let Some(current) = current_task() else {
        return;
    };
    if should_preempt(&current) {
        yield_now();
    }
}

fn switch_to(next: Arc<Task>) {
    let _irq = trap::disable_local();

    let mut processor = PROCESSOR.lock();
    if let Some(ref current) = processor.current {
        if Arc::ptr_eq(current, &next) {
            current.set_status(TaskStatus::Running);
            return;
        }
        current.check_canary();
    }
    next.check_canary();
    next.set_status(TaskStatus::Running);
    if next.has_own_stack() {
        segment::set_kernel_stack(next.kstack_top());
    }
    if let Some(hook) = SWITCH_HOOK.get() {
        hook(&next);
    }

    let next_ctx = next.ctx_ptr();
    let prev = processor.current.replace(next);
    let prev_ctx = match prev {
        Some(prev_task) => {
            let ptr = prev_task.ctx_ptr();
            if prev_task.status() == TaskStatus::Dying {
                *PREV_DYING.lock() = Some(prev_task);
            }
            // Otherwise some waiter list or the ready queue keeps the
            // task alive; dropping our reference here is fine.
            ptr
        }
        None => &mut processor.scratch_ctx as *mut TaskContext,
    };
    drop(processor);

    unsafe {
        context_switch(prev_ctx, next_ctx);
    }
    // Back on this stack: finish the switch that resumed us.
    reap_dying();
}

/// Frees the task that died getting us scheduled, if any.
pub(crate) fn reap_dying() {
    let dead = PREV_DYING.lock_irq_disabled().take();
    drop(dead);
}

/// Blocks the current task. Interrupts must be disabled and the caller
/// must already have published the task somewhere it can be woken from.
pub fn block_current() {
    let current = current_task().expect("blocking outside a task");
    current.set_status_blocked();
    schedule();
}

/// Makes a blocked task ready. Unblocking a task that is not blocked is
/// a bug and is asserted.
pub fn unblock(task: Arc<Task>) {
    let _irq = trap::disable_local();
    {
        let mut sched = task.sched.lock();
        assert!(
            sched.status == TaskStatus::Blocked,
            "unblocking task {} which is {:?}",
            task.tid(),
            sched.status
        );
        sched.status = TaskStatus::Ready;
    }
    let outranks = task.effective_priority() > current_priority();
    super::scheduler::enqueue_task(task);
    if outranks {
        trap::set_yield_on_return();
    }
}

/// Terminates the calling task; never returns.
pub fn exit_current() -> ! {
    {
        let _irq = trap::disable_local();
        let current = {
            let mut processor = PROCESSOR.lock();
            processor.current.take().expect("exit outside a task")
        };
        super::unregister_task(current.tid());
        current.set_status(TaskStatus::Dying);
        *PREV_DYING.lock() = Some(current);
        schedule();
    }
    unreachable!("a dying task was rescheduled");
}
