#![allow(unused)]

pub(crate) use alloc::{
    boxed::Box,
    collections::{BTreeMap, BTreeSet, VecDeque},
    format,
    string::{String, ToString},
    sync::{Arc, Weak},
    vec,
    vec::Vec,
};
pub(crate) use core::{any::Any, fmt::Debug};

pub(crate) use osprey_frame::config::PAGE_SIZE;
pub(crate) use osprey_frame::sync::{Mutex, MutexGuard, RwMutex, Semaphore, SpinLock};
pub(crate) use osprey_frame::vm::{Paddr, Vaddr};

pub(crate) use bitflags::bitflags;
pub(crate) use lazy_static::lazy_static;
pub(crate) use log::{debug, error, info, trace, warn};

pub(crate) use crate::error::{Errno, Error};
pub(crate) use crate::{current_process, return_errno, return_errno_with_message};

pub(crate) type Result<T> = core::result::Result<T, Error>;

/// The process of the calling thread; panics off the process path.
#[macro_export]
macro_rules! current {
    () => {
        $crate::process::current().expect("no current process")
    };
}

/// The process of the calling thread, or `None` for pure kernel
/// threads.
#[macro_export]
macro_rules! current_process {
    () => {
        $crate::process::current()
    };
}

pub(crate) use crate::current;
