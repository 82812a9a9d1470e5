//! Sleeping mutexes with priority donation.
//!
//! A lock knows its holder; a blocked acquirer publishes the lock it
//! waits on and pushes its effective priority down the chain of
//! holders, bounded at eight hops, which also defuses donation cycles.
//! Release recomputes the old holder's effective priority from its
//! remaining locks and hands the mutex to the highest-priority waiter.

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};

use crate::prelude::*;
use crate::sync::semaphore::pop_highest;
use crate::sync::SpinLock;
use crate::task::{self, Task};
use crate::trap;

/// Donation chains are walked at most this deep.
pub const DONATION_MAX_DEPTH: usize = 8;

pub(crate) struct RawMutexInner {
    pub(crate) holder: Option<Arc<Task>>,
    pub(crate) waiters: Vec<Arc<Task>>,
}

/// The lock proper, shared between the `Mutex<T>` facade and the task
/// bookkeeping (held-locks lists, waited-on lock).
pub struct RawMutex {
    pub(crate) inner: SpinLock<RawMutexInner>,
}

impl RawMutex {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> Arc<Self> {
        Arc::new(RawMutex {
            inner: SpinLock::new(RawMutexInner {
                holder: None,
                waiters: Vec::new(),
            }),
        })
    }

    /// The maximum effective priority among the lock's waiters.
    pub(crate) fn max_waiter_priority(&self) -> u32 {
        let inner = self.inner.lock();
        inner
            .waiters
            .iter()
            .map(|w| w.effective_priority())
            .max()
            .unwrap_or(0)
    }

    pub fn acquire(self: &Arc<Self>) {
        debug_assert!(!trap::in_interrupt());
        let _irq = trap::disable_local();
        let current = task::current_task().expect("mutex acquire outside a task");
        loop {
            let mut inner = self.inner.lock();
            match inner.holder {
                None => {
                    inner.holder = Some(current.clone());
                    drop(inner);
                    current.lock_acquired(self.clone());
                    return;
                }
                Some(ref holder) if Arc::ptr_eq(holder, &current) => {
                    // Release picked us before we ran; treat as owned.
                    drop(inner);
                    current.lock_acquired(self.clone());
                    return;
                }
                Some(_) => {}
            }
            inner.waiters.push(current.clone());
            drop(inner);
            current.set_waiting_lock(Some(self.clone()));
            self.donate(current.effective_priority());
            current.set_status_blocked();
            task::schedule();
            current.set_waiting_lock(None);
        }
    }

    /// Raises each holder along the waiting chain to at least
    /// `priority`.
    fn donate(self: &Arc<Self>, priority: u32) {
        let mut lock = self.clone();
        for _ in 0..DONATION_MAX_DEPTH {
            let holder = {
                let inner = lock.inner.lock();
                match inner.holder {
                    Some(ref h) => h.clone(),
                    None => return,
                }
            };
            holder.raise_effective_priority(priority);
            let next = match holder.waiting_lock() {
                Some(next) => next,
                None => return,
            };
            lock = next;
        }
    }

    pub fn release(self: &Arc<Self>) {
        let _irq = trap::disable_local();
        let current = task::current_task().expect("mutex release outside a task");
        let next = {
            let mut inner = self.inner.lock();
            assert!(
                inner
                    .holder
                    .as_ref()
                    .is_some_and(|h| Arc::ptr_eq(h, &current)),
                "mutex released by a non-holder"
            );
            let next = pop_highest(&mut inner.waiters);
            inner.holder = next.clone();
            next
        };
        // Shed any donation that came through this lock.
        current.lock_released(self);

        if let Some(next) = next {
            let outranks = next.effective_priority() > current.effective_priority();
            task::unblock(next);
            if outranks {
                task::yield_now();
            }
        }
    }

    pub(crate) fn holder(&self) -> Option<Arc<Task>> {
        self.inner.lock().holder.clone()
    }
}

/// A sleeping mutual-exclusion lock.
pub struct Mutex<T: ?Sized> {
    raw: Arc<RawMutex>,
    val: UnsafeCell<T>,
}

impl<T> Mutex<T> {
    pub fn new(val: T) -> Self {
        Mutex {
            raw: RawMutex::new(),
            val: UnsafeCell::new(val),
        }
    }
}

impl<T: ?Sized> Mutex<T> {
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.raw.acquire();
        MutexGuard { mutex: self }
    }

    /// Whether the calling task holds this mutex.
    pub fn is_held_by_current(&self) -> bool {
        let current = task::current_task();
        match (self.raw.holder(), current) {
            (Some(holder), Some(current)) => Arc::ptr_eq(&holder, &current),
            _ => false,
        }
    }

    pub(crate) fn raw(&self) -> &Arc<RawMutex> {
        &self.raw
    }
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Mutex { .. }")
    }
}

pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    /// The mutex this guard came from; the condition variable uses it
    /// to reacquire after a wait.
    pub(crate) fn source(guard: &Self) -> &'a Mutex<T> {
        guard.mutex
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.val.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.val.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.raw.release();
    }
}

impl<T: ?Sized> !Send for MutexGuard<'_, T> {}

unsafe impl<T: ?Sized + Sync> Sync for MutexGuard<'_, T> {}
