//! The Osprey kernel services: processes and their address spaces,
//! demand paging over the frame table and swap, the mounted file
//! system, and the system-call surface. Everything machine-level comes
//! from `osprey-frame`; everything storage-level from `osprey-jfs`.

#![no_std]
#![allow(dead_code)]

extern crate alloc;

#[macro_use]
pub mod error;
pub mod fs;
pub mod prelude;
pub mod process;
pub mod sched;
pub mod syscall;
pub mod thread;
pub mod util;
pub mod vm;

use osprey_frame::boot::KCmdlineArg;

use crate::prelude::*;

/// Brings the services up, in dependency order: scheduling policy,
/// paging, then the file system. `osprey_frame::init()` must have run.
pub fn init(cmdline: &KCmdlineArg) {
    sched::init(cmdline.scheduler);
    process::init();
    vm::init();
    fs::init(cmdline.format_filesys);
    info!("kernel: services initialized");
}

/// Runs the boot actions from the command line: execute `run <prog>`
/// if present, then shut down if `-q` was given. `-T` arms a watchdog
/// that gives up on a wedged run.
pub fn run_actions(cmdline: &KCmdlineArg) {
    if let Some(secs) = cmdline.timeout_secs {
        osprey_frame::task::TaskOptions::new(move || {
            osprey_frame::timer::sleep_ticks(secs * osprey_frame::config::TIMER_FREQ);
            osprey_frame::println!("watchdog: timed out after {} seconds", secs);
            osprey_frame::arch::qemu::exit_qemu(osprey_frame::arch::qemu::QemuExitCode::Failed);
        })
        .name("watchdog")
        .spawn()
        .expect("spawning the watchdog failed");
    }

    if let Some(argv) = cmdline.run_argv() {
        let line = argv.join(" ");
        match process::spawn_from_cmdline(&line, None) {
            Ok(child) => {
                let code = process::wait_for(&child);
                info!("kernel: '{}' finished with {}", line, code);
            }
            Err(err) => {
                error!("kernel: failed to run '{}': {:?}", line, err);
            }
        }
    }

    fs::shutdown();
    if cmdline.quiet_shutdown {
        osprey_frame::arch::qemu::exit_qemu(osprey_frame::arch::qemu::QemuExitCode::Success);
    }
}
