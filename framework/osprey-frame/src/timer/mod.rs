//! The tick counter, the sleep queue, and the per-tick scheduler hooks.

use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::config::TIME_SLICE_TICKS;
use crate::prelude::*;
use crate::sync::SpinLock;
use crate::task::{self, Task};
use crate::trap;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Sleeping tasks, keyed by absolute wake-up tick. Wakeups happen in
/// deadline order; ties wake together in enqueue order.
static SLEEP_QUEUE: SpinLock<BTreeMap<u64, Vec<Arc<Task>>>> = SpinLock::new(BTreeMap::new());

static SLICE_LEFT: AtomicU64 = AtomicU64::new(TIME_SLICE_TICKS);

/// Ticks since boot.
pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Blocks the calling task for at least `ticks` timer ticks.
pub fn sleep_ticks(ticks: u64) {
    if ticks == 0 {
        task::yield_now();
        return;
    }
    let _irq = trap::disable_local();
    let deadline = self::ticks() + ticks;
    let current = task::current_task().expect("sleep outside a task");
    SLEEP_QUEUE
        .lock()
        .entry(deadline)
        .or_insert_with(Vec::new)
        .push(current.clone());
    current.set_status_blocked();
    task::schedule();
}

/// The IRQ 0 handler: advance time, wake sleepers, charge the slice.
fn on_tick() {
    let now = TICKS.fetch_add(1, Ordering::Relaxed) + 1;

    // Wake everything whose deadline has passed, earliest first.
    loop {
        let batch = {
            let mut queue = SLEEP_QUEUE.lock();
            match queue.first_key_value() {
                Some((&deadline, _)) if deadline <= now => queue.remove(&deadline),
                _ => None,
            }
        };
        let Some(batch) = batch else { break };
        for sleeper in batch {
            task::unblock(sleeper);
        }
    }

    let current = task::current_task();
    task::scheduler_tick(current.as_ref(), now);

    // Round-robin among equals: preempt when the slice runs out.
    if SLICE_LEFT.fetch_sub(1, Ordering::Relaxed) <= 1 {
        SLICE_LEFT.store(TIME_SLICE_TICKS, Ordering::Relaxed);
        trap::set_yield_on_return();
    }
}

pub(crate) fn init() {
    trap::register_irq_handler(0, on_tick);
}
