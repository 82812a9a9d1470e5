mod condvar;
mod mutex;
mod rwmutex;
mod semaphore;
mod spin;

pub use condvar::Condvar;
pub use mutex::{Mutex, MutexGuard, RawMutex, DONATION_MAX_DEPTH};
pub use rwmutex::{RwMutex, RwMutexReadGuard, RwMutexWriteGuard};
pub use semaphore::Semaphore;
pub use spin::{SpinLock, SpinLockGuard, SpinLockIrqDisabledGuard};
