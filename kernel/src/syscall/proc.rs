use osprey_frame::arch::qemu::{exit_qemu, QemuExitCode};
use osprey_frame::cpu::UserContext;

use crate::prelude::*;
use crate::process::{self, Process};
use crate::util;

pub fn sys_halt() -> Result<i32> {
    debug!("halt");
    crate::fs::shutdown();
    exit_qemu(QemuExitCode::Success);
}

pub fn sys_exit(process: &Arc<Process>, code: i32) -> Result<i32> {
    debug!("exit({})", code);
    process::exit_process(process, code);
}

pub fn sys_exec(process: &Arc<Process>, cmdline_addr: Vaddr) -> Result<i32> {
    let cmdline = util::read_cstring_from_user(cmdline_addr, util::MAX_USER_STR)?;
    debug!("exec(\"{}\")", cmdline);
    let child = process::spawn_from_cmdline(&cmdline, Some(process))?;
    Ok(child.pid() as i32)
}

pub fn sys_wait(process: &Arc<Process>, pid: u32) -> Result<i32> {
    debug!("wait({})", pid);
    process::wait_pid(process, pid)
}

pub fn sys_fork(process: &Arc<Process>, ctx: &UserContext) -> Result<i32> {
    debug!("fork");
    let pid = process::fork(process, ctx)?;
    Ok(pid as i32)
}

/// The identity call the harness uses to prove the dispatcher works.
pub fn sys_practice(value: i32) -> Result<i32> {
    Ok(value)
}

/// Sums the reciprocal-factorial series to `terms` terms, scaled by
/// 10^4: with enough terms the answer settles at 27182.
pub fn sys_compute_e(terms: i32) -> Result<i32> {
    if terms < 0 {
        return_errno!(Errno::EINVAL);
    }
    const SCALE: i64 = 10_000;
    let mut sum: i64 = 0;
    let mut term: i64 = SCALE; // 1/0!
    for k in 0..terms as i64 {
        sum += term;
        term /= k + 1;
        if term == 0 {
            break;
        }
    }
    Ok(sum as i32)
}
