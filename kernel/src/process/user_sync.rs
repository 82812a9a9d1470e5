//! Kernel-backed synchronization objects for user threads.
//!
//! `lock_init`/`sema_init` hand small ids back to user space; the
//! objects themselves are the frame's donation-aware mutexes and
//! semaphores, so a user lock participates in priority inheritance the
//! same way a kernel lock does.

use core::sync::atomic::{AtomicU32, Ordering};

use osprey_frame::sync::RawMutex;
use osprey_frame::task::Tid;

use crate::prelude::*;

const SYNC_MAX: usize = 128;

const NO_HOLDER: u32 = 0;

struct UserLock {
    raw: Arc<RawMutex>,
    /// The tid holding the lock, for catching re-acquisition and bad
    /// releases without panicking the kernel on user input.
    holder: AtomicU32,
}

pub struct UserSyncTable {
    locks: Mutex<Vec<Arc<UserLock>>>,
    semas: Mutex<Vec<Arc<Semaphore>>>,
}

impl UserSyncTable {
    pub fn new() -> Self {
        UserSyncTable {
            locks: Mutex::new(Vec::new()),
            semas: Mutex::new(Vec::new()),
        }
    }

    pub fn lock_create(&self) -> Result<u32> {
        let mut locks = self.locks.lock();
        if locks.len() >= SYNC_MAX {
            return_errno_with_message!(Errno::ENOMEM, "too many user locks");
        }
        locks.push(Arc::new(UserLock {
            raw: RawMutex::new(),
            holder: AtomicU32::new(NO_HOLDER),
        }));
        Ok((locks.len() - 1) as u32)
    }

    pub fn lock_acquire(&self, id: u32, tid: Tid) -> Result<()> {
        let lock = self.lock_by_id(id)?;
        if lock.holder.load(Ordering::Relaxed) == tid {
            return_errno_with_message!(Errno::EINVAL, "lock already held by caller");
        }
        lock.raw.acquire();
        lock.holder.store(tid, Ordering::Relaxed);
        Ok(())
    }

    pub fn lock_release(&self, id: u32, tid: Tid) -> Result<()> {
        let lock = self.lock_by_id(id)?;
        if lock.holder.load(Ordering::Relaxed) != tid {
            return_errno_with_message!(Errno::EPERM, "lock not held by caller");
        }
        lock.holder.store(NO_HOLDER, Ordering::Relaxed);
        lock.raw.release();
        Ok(())
    }

    pub fn sema_create(&self, value: usize) -> Result<u32> {
        let mut semas = self.semas.lock();
        if semas.len() >= SYNC_MAX {
            return_errno_with_message!(Errno::ENOMEM, "too many user semaphores");
        }
        semas.push(Arc::new(Semaphore::new(value)));
        Ok((semas.len() - 1) as u32)
    }

    pub fn sema_down(&self, id: u32) -> Result<()> {
        let sema = self.sema_by_id(id)?;
        sema.down();
        Ok(())
    }

    pub fn sema_up(&self, id: u32) -> Result<()> {
        let sema = self.sema_by_id(id)?;
        sema.up();
        Ok(())
    }

    fn lock_by_id(&self, id: u32) -> Result<Arc<UserLock>> {
        self.locks
            .lock()
            .get(id as usize)
            .cloned()
            .ok_or(Error::new(Errno::EINVAL))
    }

    fn sema_by_id(&self, id: u32) -> Result<Arc<Semaphore>> {
        self.semas
            .lock()
            .get(id as usize)
            .cloned()
            .ok_or(Error::new(Errno::EINVAL))
    }
}

impl Default for UserSyncTable {
    fn default() -> Self {
        Self::new()
    }
}
