//! A sleeping reader-writer lock, writer-preferring: once a writer is
//! queued, new readers wait, so a stream of readers cannot starve it.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

use crate::prelude::*;
use crate::sync::SpinLock;
use crate::task::{self, Task};
use crate::trap;

struct RwState {
    readers: usize,
    writer_active: bool,
    read_waiters: Vec<Arc<Task>>,
    write_waiters: Vec<Arc<Task>>,
}

pub struct RwMutex<T: ?Sized> {
    state: SpinLock<RwState>,
    val: UnsafeCell<T>,
}

impl<T> RwMutex<T> {
    pub const fn new(val: T) -> Self {
        RwMutex {
            state: SpinLock::new(RwState {
                readers: 0,
                writer_active: false,
                read_waiters: Vec::new(),
                write_waiters: Vec::new(),
            }),
            val: UnsafeCell::new(val),
        }
    }
}

impl<T: ?Sized> RwMutex<T> {
    pub fn read(&self) -> RwMutexReadGuard<'_, T> {
        debug_assert!(!trap::in_interrupt());
        let _irq = trap::disable_local();
        loop {
            let mut state = self.state.lock();
            if !state.writer_active && state.write_waiters.is_empty() {
                state.readers += 1;
                return RwMutexReadGuard { rw: self };
            }
            let current = task::current_task().expect("rwmutex read outside a task");
            state.read_waiters.push(current.clone());
            current.set_status_blocked();
            drop(state);
            task::schedule();
        }
    }

    pub fn write(&self) -> RwMutexWriteGuard<'_, T> {
        debug_assert!(!trap::in_interrupt());
        let _irq = trap::disable_local();
        loop {
            let mut state = self.state.lock();
            if !state.writer_active && state.readers == 0 {
                state.writer_active = true;
                return RwMutexWriteGuard { rw: self };
            }
            let current = task::current_task().expect("rwmutex write outside a task");
            state.write_waiters.push(current.clone());
            current.set_status_blocked();
            drop(state);
            task::schedule();
        }
    }

    fn release_read(&self) {
        let _irq = trap::disable_local();
        let mut state = self.state.lock();
        state.readers -= 1;
        if state.readers == 0 {
            if let Some(writer) = super::semaphore::pop_highest(&mut state.write_waiters) {
                drop(state);
                task::unblock(writer);
            }
        }
    }

    fn release_write(&self) {
        let _irq = trap::disable_local();
        let mut state = self.state.lock();
        state.writer_active = false;
        if let Some(writer) = super::semaphore::pop_highest(&mut state.write_waiters) {
            drop(state);
            task::unblock(writer);
            return;
        }
        let readers = core::mem::take(&mut state.read_waiters);
        drop(state);
        for reader in readers {
            task::unblock(reader);
        }
    }
}

unsafe impl<T: ?Sized + Send> Send for RwMutex<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for RwMutex<T> {}

pub struct RwMutexReadGuard<'a, T: ?Sized> {
    rw: &'a RwMutex<T>,
}

impl<T: ?Sized> Deref for RwMutexReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.rw.val.get() }
    }
}

impl<T: ?Sized> Drop for RwMutexReadGuard<'_, T> {
    fn drop(&mut self) {
        self.rw.release_read();
    }
}

pub struct RwMutexWriteGuard<'a, T: ?Sized> {
    rw: &'a RwMutex<T>,
}

impl<T: ?Sized> Deref for RwMutexWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.rw.val.get() }
    }
}

impl<T: ?Sized> DerefMut for RwMutexWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.rw.val.get() }
    }
}

impl<T: ?Sized> Drop for RwMutexWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.rw.release_write();
    }
}

impl<T: ?Sized> !Send for RwMutexReadGuard<'_, T> {}
impl<T: ?Sized> !Send for RwMutexWriteGuard<'_, T> {}
