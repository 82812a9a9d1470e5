//! The task control block.
//!
//! Tasks live in an arena of `Arc`s keyed by id (the all-tasks table in
//! `mod.rs`); the kernel stack is a separate page whose lowest word is
//! a canary, checked on every switch. All mutable scheduling state sits
//! behind one spin lock and is only touched with interrupts disabled.

use core::sync::atomic::{AtomicU32, Ordering};

use intrusive_collections::{intrusive_adapter, LinkedListAtomicLink};

use crate::arch::context::TaskContext;
use crate::config::PAGE_SIZE;
use crate::prelude::*;
use crate::sync::{RawMutex, SpinLock};
use crate::task::priority::Priority;
use crate::vm::{self, Pool, VmFrame};

pub type Tid = u32;

static TID_ALLOCATOR: AtomicU32 = AtomicU32::new(1);

const STACK_CANARY: u32 = 0x0597_12EF;

/// The status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Ready,
    Blocked,
    Dying,
}

pub(crate) enum KernelStack {
    Owned(VmFrame),
    /// The boot thread keeps the stack the boot path set up.
    Boot,
}

impl KernelStack {
    fn new() -> Result<Self> {
        let frame = vm::alloc_frame(Pool::Kernel).ok_or(crate::Error::NoMemory)?;
        // Plant the canary in the lowest word.
        frame.copy_from_slice(0, &STACK_CANARY.to_le_bytes());
        Ok(KernelStack::Owned(frame))
    }

    pub(crate) fn top(&self) -> usize {
        match self {
            KernelStack::Owned(frame) => frame.kaddr() + PAGE_SIZE,
            KernelStack::Boot => panic!("the boot stack has no tracked top"),
        }
    }

    fn canary_intact(&self) -> bool {
        match self {
            KernelStack::Owned(frame) => {
                let mut word = [0u8; 4];
                frame.copy_to_slice(0, &mut word);
                u32::from_le_bytes(word) == STACK_CANARY
            }
            KernelStack::Boot => true,
        }
    }
}

pub(crate) struct TaskSched {
    pub status: TaskStatus,
    pub base_priority: u32,
    pub eff_priority: u32,
    pub nice: i32,
    /// Raw 17.14 fixed-point bits; the MLFQS policy interprets them.
    pub recent_cpu: i32,
    pub ctx: TaskContext,
    pub held_locks: Vec<Arc<RawMutex>>,
    pub waiting_lock: Option<Arc<RawMutex>>,
}

/// A kernel thread of control.
pub struct Task {
    tid: Tid,
    name: String,
    idle: bool,
    kstack: KernelStack,
    func: SpinLock<Option<Box<dyn FnOnce() + Send>>>,
    data: Box<dyn Any + Send + Sync>,
    pub(crate) sched: SpinLock<TaskSched>,
    link: LinkedListAtomicLink,
}

intrusive_adapter!(pub TaskAdapter = Arc<Task>: Task { link: LinkedListAtomicLink });

impl Task {
    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the idle task (excluded from load accounting).
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// The per-task payload; the kernel hangs its thread context here.
    #[allow(clippy::borrowed_box)]
    pub fn data(&self) -> &Box<dyn Any + Send + Sync> {
        &self.data
    }

    pub fn status(&self) -> TaskStatus {
        self.sched.lock_irq_disabled().status
    }

    pub(crate) fn set_status(&self, status: TaskStatus) {
        self.sched.lock_irq_disabled().status = status;
    }

    /// Marks the task blocked; the caller must already have interrupts
    /// disabled and must follow up with a `schedule()`.
    pub fn set_status_blocked(&self) {
        debug_assert!(!crate::arch::irq::is_local_enabled());
        self.sched.lock().status = TaskStatus::Blocked;
    }

    pub fn base_priority(&self) -> u32 {
        self.sched.lock_irq_disabled().base_priority
    }

    pub fn effective_priority(&self) -> u32 {
        self.sched.lock_irq_disabled().eff_priority
    }

    /// Sets the base priority and recomputes the effective one from
    /// the donations still active. Returns the new effective priority.
    pub fn set_priority(&self, priority: Priority) -> u32 {
        let _irq = crate::trap::disable_local();
        let held = {
            let mut sched = self.sched.lock();
            sched.base_priority = priority.get();
            sched.held_locks.clone()
        };
        self.recompute_effective(&held)
    }

    /// Raises the effective priority to at least `priority` (a
    /// donation; never lowers).
    pub(crate) fn raise_effective_priority(&self, priority: u32) {
        let mut sched = self.sched.lock();
        if sched.eff_priority < priority {
            sched.eff_priority = priority;
        }
    }

    fn recompute_effective(&self, held: &[Arc<RawMutex>]) -> u32 {
        let donated = held
            .iter()
            .map(|lock| lock.max_waiter_priority())
            .max()
            .unwrap_or(0);
        let mut sched = self.sched.lock();
        sched.eff_priority = sched.base_priority.max(donated);
        sched.eff_priority
    }

    pub(crate) fn lock_acquired(&self, lock: Arc<RawMutex>) {
        self.sched.lock().held_locks.push(lock);
    }

    pub(crate) fn lock_released(&self, lock: &Arc<RawMutex>) {
        let held = {
            let mut sched = self.sched.lock();
            sched.held_locks.retain(|l| !Arc::ptr_eq(l, lock));
            sched.held_locks.clone()
        };
        self.recompute_effective(&held);
    }

    pub(crate) fn set_waiting_lock(&self, lock: Option<Arc<RawMutex>>) {
        self.sched.lock().waiting_lock = lock;
    }

    pub(crate) fn waiting_lock(&self) -> Option<Arc<RawMutex>> {
        self.sched.lock().waiting_lock.clone()
    }

    /// The MLFQS niceness, in `[-20, 20]`.
    pub fn nice(&self) -> i32 {
        self.sched.lock_irq_disabled().nice
    }

    pub fn set_nice(&self, nice: i32) {
        self.sched.lock_irq_disabled().nice = nice.clamp(-20, 20);
    }

    /// Raw 17.14 bits of `recent_cpu`; the scheduling policy owns the
    /// interpretation.
    pub fn recent_cpu_raw(&self) -> i32 {
        self.sched.lock_irq_disabled().recent_cpu
    }

    pub fn set_recent_cpu_raw(&self, raw: i32) {
        self.sched.lock_irq_disabled().recent_cpu = raw;
    }

    /// Directly sets the effective priority; the MLFQS recomputation
    /// path uses this (donation is off in that mode).
    pub fn set_effective_priority(&self, priority: Priority) {
        self.sched.lock_irq_disabled().eff_priority = priority.get();
    }

    pub(crate) fn kstack_top(&self) -> usize {
        self.kstack.top()
    }

    pub(crate) fn has_own_stack(&self) -> bool {
        matches!(self.kstack, KernelStack::Owned(_))
    }

    pub(crate) fn check_canary(&self) {
        assert!(
            self.kstack.canary_intact(),
            "kernel stack overflow in task {} ({})",
            self.tid,
            self.name
        );
    }

    pub(crate) fn take_func(&self) -> Option<Box<dyn FnOnce() + Send>> {
        self.func.lock_irq_disabled().take()
    }

    pub(crate) fn ctx_ptr(&self) -> *mut TaskContext {
        // The pointer outlives the guard; sound because context
        // switches happen with interrupts disabled on one CPU.
        &mut self.sched.lock().ctx as *mut TaskContext
    }
}

impl core::fmt::Debug for Task {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Task")
            .field("tid", &self.tid)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Options to create or spawn a new task.
pub struct TaskOptions {
    name: String,
    priority: Priority,
    func: Option<Box<dyn FnOnce() + Send>>,
    data: Option<Box<dyn Any + Send + Sync>>,
    idle: bool,
}

impl TaskOptions {
    pub fn new<F>(func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            name: String::from("unnamed"),
            priority: Priority::default(),
            func: Some(Box::new(func)),
            data: None,
            idle: false,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn data<T>(mut self, data: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.data = Some(Box::new(data));
        self
    }

    pub(crate) fn idle(mut self) -> Self {
        self.idle = true;
        self
    }

    /// Builds the task without scheduling it.
    pub fn build(self) -> Result<Arc<Task>> {
        let kstack = KernelStack::new()?;
        let mut ctx = TaskContext::default();
        // The first switch `ret`s into the trampoline; plant its
        // address where the stack pointer will find it.
        let top = kstack.top();
        let entry = super::kernel_task_entry as usize as u32;
        match &kstack {
            KernelStack::Owned(frame) => {
                frame.copy_from_slice(PAGE_SIZE - 4, &entry.to_le_bytes());
            }
            KernelStack::Boot => unreachable!(),
        }
        ctx.regs.esp = (top - 4) as u32;

        let task = Arc::new(Task {
            tid: TID_ALLOCATOR.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            idle: self.idle,
            kstack,
            func: SpinLock::new(self.func),
            data: self.data.unwrap_or_else(|| Box::new(())),
            sched: SpinLock::new(TaskSched {
                status: TaskStatus::Ready,
                base_priority: self.priority.get(),
                eff_priority: self.priority.get(),
                nice: 0,
                recent_cpu: 0,
                ctx,
                held_locks: Vec::new(),
                waiting_lock: None,
            }),
            link: LinkedListAtomicLink::new(),
        });
        super::register_task(&task);
        Ok(task)
    }

    /// Builds the task and puts it on the ready queue, preempting if it
    /// outranks the caller.
    pub fn spawn(self) -> Result<Arc<Task>> {
        let task = self.build()?;
        super::activate(task.clone());
        Ok(task)
    }
}

/// Wraps the already-running boot flow of control into a task so the
/// scheduler has something to switch away from.
pub(crate) fn adopt_boot_task() -> Arc<Task> {
    let task = Arc::new(Task {
        tid: TID_ALLOCATOR.fetch_add(1, Ordering::Relaxed),
        name: String::from("main"),
        idle: false,
        kstack: KernelStack::Boot,
        func: SpinLock::new(None),
        data: Box::new(()),
        sched: SpinLock::new(TaskSched {
            status: TaskStatus::Running,
            base_priority: Priority::default().get(),
            eff_priority: Priority::default().get(),
            nice: 0,
            recent_cpu: 0,
            ctx: TaskContext::default(),
            held_locks: Vec::new(),
            waiting_lock: None,
        }),
        link: LinkedListAtomicLink::new(),
    });
    super::register_task(&task);
    task
}
