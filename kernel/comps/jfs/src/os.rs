//! OS-specific or OS-dependent APIs.
//!
//! In the kernel this maps onto the frame's sleeping locks and kernel
//! threads. On the host it maps onto `std::sync` and `std::thread`, so
//! the storage stack can be driven end to end by ordinary tests.

cfg_if::cfg_if! {
    if #[cfg(target_os = "none")] {
        pub use kernel::*;
    } else {
        pub use host::*;
    }
}

#[cfg(target_os = "none")]
mod kernel {
    pub use osprey_frame::sync::{
        Condvar, Mutex, MutexGuard, RwMutex, RwMutexReadGuard, RwMutexWriteGuard,
    };

    /// Spawns a detached background kernel thread.
    pub fn spawn_worker(name: &str, body: impl FnOnce() + Send + 'static) {
        osprey_frame::task::TaskOptions::new(body)
            .name(name)
            .spawn()
            .expect("spawning an fs worker thread failed");
    }

    /// Blocks the calling thread for at least `ms` milliseconds.
    pub fn sleep_ms(ms: u64) {
        let ticks = (ms * osprey_frame::config::TIMER_FREQ / 1000).max(1);
        osprey_frame::timer::sleep_ticks(ticks);
    }
}

#[cfg(not(target_os = "none"))]
mod host {
    use core::ops::{Deref, DerefMut};
    use core::time::Duration;

    /// A sleeping mutex with the kernel mutex's interface.
    pub struct Mutex<T>(std::sync::Mutex<T>);

    pub struct MutexGuard<'a, T>(std::sync::MutexGuard<'a, T>);

    impl<T> Mutex<T> {
        pub const fn new(val: T) -> Self {
            Self(std::sync::Mutex::new(val))
        }

        pub fn lock(&self) -> MutexGuard<'_, T> {
            MutexGuard(self.0.lock().unwrap())
        }
    }

    impl<T> Deref for MutexGuard<'_, T> {
        type Target = T;

        fn deref(&self) -> &T {
            &self.0
        }
    }

    impl<T> DerefMut for MutexGuard<'_, T> {
        fn deref_mut(&mut self) -> &mut T {
            &mut self.0
        }
    }

    /// A sleeping reader-writer lock.
    pub struct RwMutex<T>(std::sync::RwLock<T>);

    pub struct RwMutexReadGuard<'a, T>(std::sync::RwLockReadGuard<'a, T>);
    pub struct RwMutexWriteGuard<'a, T>(std::sync::RwLockWriteGuard<'a, T>);

    impl<T> RwMutex<T> {
        pub const fn new(val: T) -> Self {
            Self(std::sync::RwLock::new(val))
        }

        pub fn read(&self) -> RwMutexReadGuard<'_, T> {
            RwMutexReadGuard(self.0.read().unwrap())
        }

        pub fn write(&self) -> RwMutexWriteGuard<'_, T> {
            RwMutexWriteGuard(self.0.write().unwrap())
        }
    }

    impl<T> Deref for RwMutexReadGuard<'_, T> {
        type Target = T;

        fn deref(&self) -> &T {
            &self.0
        }
    }

    impl<T> Deref for RwMutexWriteGuard<'_, T> {
        type Target = T;

        fn deref(&self) -> &T {
            &self.0
        }
    }

    impl<T> DerefMut for RwMutexWriteGuard<'_, T> {
        fn deref_mut(&mut self) -> &mut T {
            &mut self.0
        }
    }

    /// A condition variable with Mesa semantics.
    pub struct Condvar(std::sync::Condvar);

    impl Condvar {
        pub const fn new() -> Self {
            Self(std::sync::Condvar::new())
        }

        pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
            MutexGuard(self.0.wait(guard.0).unwrap())
        }

        pub fn notify_one(&self) {
            self.0.notify_one();
        }

        pub fn notify_all(&self) {
            self.0.notify_all();
        }
    }

    /// Spawns a detached background thread.
    pub fn spawn_worker(name: &str, body: impl FnOnce() + Send + 'static) {
        std::thread::Builder::new()
            .name(name.into())
            .spawn(body)
            .expect("spawning an fs worker thread failed");
    }

    /// Blocks the calling thread for at least `ms` milliseconds.
    pub fn sleep_ms(ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}
