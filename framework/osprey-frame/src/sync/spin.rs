//! A spin lock.
//!
//! On this uniprocessor the lock never actually spins; what matters is
//! what it excludes. `lock` disables preemption, which fences out other
//! threads; `lock_irq_disabled` additionally fences out interrupt
//! handlers and is required for any state an external handler touches.

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::task::DisablePreemptGuard;
use crate::trap::{disable_local, DisabledLocalIrqGuard};

pub struct SpinLock<T> {
    val: UnsafeCell<T>,
    lock: AtomicBool,
}

impl<T> SpinLock<T> {
    pub const fn new(val: T) -> Self {
        Self {
            val: UnsafeCell::new(val),
            lock: AtomicBool::new(false),
        }
    }

    /// Acquires with local IRQs disabled. Required when an interrupt
    /// handler may take the same lock.
    pub fn lock_irq_disabled(&self) -> SpinLockIrqDisabledGuard<'_, T> {
        let irq_guard = disable_local();
        self.acquire_lock();
        SpinLockIrqDisabledGuard {
            lock: self,
            _irq_guard: irq_guard,
        }
    }

    /// Acquires with preemption (but not IRQs) disabled.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let preempt_guard = DisablePreemptGuard::new();
        self.acquire_lock();
        SpinLockGuard {
            lock: self,
            _preempt_guard: preempt_guard,
        }
    }

    fn acquire_lock(&self) {
        while self
            .lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
    }

    fn release_lock(&self) {
        self.lock.store(false, Ordering::Release);
    }
}

impl<T: fmt::Debug> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("SpinLock { .. }")
    }
}

unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

pub struct SpinLockIrqDisabledGuard<'a, T> {
    lock: &'a SpinLock<T>,
    _irq_guard: DisabledLocalIrqGuard,
}

impl<T> Deref for SpinLockIrqDisabledGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.val.get() }
    }
}

impl<T> DerefMut for SpinLockIrqDisabledGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.val.get() }
    }
}

impl<T> Drop for SpinLockIrqDisabledGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_lock();
    }
}

impl<T> !Send for SpinLockIrqDisabledGuard<'_, T> {}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    _preempt_guard: DisablePreemptGuard,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.val.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.val.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_lock();
    }
}

impl<T> !Send for SpinLockGuard<'_, T> {}
