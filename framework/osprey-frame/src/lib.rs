//! The framework part of Osprey: everything that touches the bare
//! machine. The kernel services above build on these interfaces and
//! never reach for the hardware directly.
//!
//! The frame owns the CPU (segments, traps, interrupt discipline), the
//! physical memory (two frame pools and the kernel heap), the MMU (page
//! directories), the timer, and the thread machinery (tasks, context
//! switches, the scheduler seam, sleeping synchronization with priority
//! donation).

#![no_std]
#![allow(dead_code)]
#![feature(negative_impls)]

extern crate alloc;
#[macro_use]
extern crate static_assertions;

pub mod arch;
pub mod boot;
pub mod config;
pub mod console;
pub mod cpu;
mod error;
pub mod logger;
pub mod panicking;
pub mod prelude;
pub mod sync;
pub mod task;
pub mod timer;
pub mod trap;
pub mod user;
pub mod vm;

pub use self::error::Error;
pub use self::prelude::Result;

/// Initializes the frame. Called exactly once, before the kernel
/// services come up and before any secondary thread exists.
pub fn init() {
    arch::serial::init();
    logger::init();
    vm::heap_allocator::init();
    boot::init();
    vm::init();
    arch::init();
    trap::init();
    timer::init();
    task::init();
    // Tasking is up; let the timer drive preemption from here on.
    unsafe { arch::irq::enable_local() };
    log::info!("frame: initialized");
}
