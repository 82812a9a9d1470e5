//! Condition variables with Mesa semantics.
//!
//! Each waiter parks on its own zero-valued semaphore; `notify_one`
//! releases the waiter whose thread has the highest effective priority.
//! A woken waiter has no guarantee about the predicate; re-test it in
//! a loop.

use crate::prelude::*;
use crate::sync::{Mutex, MutexGuard, Semaphore, SpinLock};
use crate::task::{self, Task};

pub struct Condvar {
    waiters: SpinLock<Vec<(Arc<Task>, Arc<Semaphore>)>>,
}

impl Condvar {
    pub const fn new() -> Self {
        Condvar {
            waiters: SpinLock::new(Vec::new()),
        }
    }

    /// Atomically releases `guard`'s mutex and blocks until notified,
    /// then reacquires the mutex. The caller must hold the mutex, and
    /// must re-test its predicate afterwards.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let mutex: &'a Mutex<T> = MutexGuard::source(&guard);
        debug_assert!(mutex.is_held_by_current());

        let token = Arc::new(Semaphore::new(0));
        {
            let current = task::current_task().expect("condvar wait outside a task");
            let mut waiters = self.waiters.lock_irq_disabled();
            waiters.push((current, token.clone()));
        }
        drop(guard);
        token.down();
        mutex.lock()
    }

    /// Wakes the highest-priority waiter, if any.
    pub fn notify_one(&self) {
        let token = {
            let mut waiters = self.waiters.lock_irq_disabled();
            if waiters.is_empty() {
                return;
            }
            let mut best = 0;
            for (idx, (task, _)) in waiters.iter().enumerate() {
                if task.effective_priority() > waiters[best].0.effective_priority() {
                    best = idx;
                }
            }
            waiters.remove(best).1
        };
        token.up();
    }

    /// Wakes every waiter.
    pub fn notify_all(&self) {
        let drained: Vec<_> = {
            let mut waiters = self.waiters.lock_irq_disabled();
            core::mem::take(&mut *waiters)
        };
        for (_, token) in drained {
            token.up();
        }
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}
