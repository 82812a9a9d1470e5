//! Counting semaphores, the primitive the sleeping locks build on.

use crate::prelude::*;
use crate::sync::SpinLock;
use crate::task::{self, Task};
use crate::trap;

struct SemaInner {
    value: usize,
    waiters: Vec<Arc<Task>>,
}

/// A counting semaphore with priority-aware wakeups: `up` unblocks the
/// waiter with the highest effective priority, FIFO among ties.
pub struct Semaphore {
    inner: SpinLock<SemaInner>,
}

impl Semaphore {
    pub const fn new(value: usize) -> Self {
        Semaphore {
            inner: SpinLock::new(SemaInner {
                value,
                waiters: Vec::new(),
            }),
        }
    }

    /// Decrements the counter, blocking while it is zero.
    ///
    /// Must not be called from an interrupt handler.
    pub fn down(&self) {
        debug_assert!(!trap::in_interrupt());
        let _irq = trap::disable_local();
        loop {
            let mut inner = self.inner.lock();
            if inner.value > 0 {
                inner.value -= 1;
                return;
            }
            let current = task::current_task().expect("sema down outside a task");
            inner.waiters.push(current.clone());
            current.set_status_blocked();
            drop(inner);
            task::schedule();
            // Woken: loop and recheck, Mesa-style.
        }
    }

    /// Attempts a decrement without blocking.
    pub fn try_down(&self) -> bool {
        let _irq = trap::disable_local();
        let mut inner = self.inner.lock();
        if inner.value > 0 {
            inner.value -= 1;
            true
        } else {
            false
        }
    }

    /// Increments the counter and wakes the best waiter, yielding right
    /// away if that waiter now outranks the caller.
    pub fn up(&self) {
        let _irq = trap::disable_local();
        let mut inner = self.inner.lock();
        inner.value += 1;
        let woken = pop_highest(&mut inner.waiters);
        drop(inner);
        if let Some(task) = woken {
            let outranks = task.effective_priority() > task::current_priority();
            task::unblock(task);
            if outranks {
                if trap::in_interrupt() {
                    trap::set_yield_on_return();
                } else {
                    task::yield_now();
                }
            }
        }
    }

    /// The current counter value, for diagnostics only.
    pub fn value(&self) -> usize {
        self.inner.lock_irq_disabled().value
    }
}

/// Removes the highest-effective-priority waiter; the first among
/// equals, so ties break FIFO.
pub(crate) fn pop_highest(waiters: &mut Vec<Arc<Task>>) -> Option<Arc<Task>> {
    if waiters.is_empty() {
        return None;
    }
    let mut best = 0;
    for (idx, task) in waiters.iter().enumerate() {
        if task.effective_priority() > waiters[best].effective_priority() {
            best = idx;
        }
    }
    Some(waiters.remove(best))
}
