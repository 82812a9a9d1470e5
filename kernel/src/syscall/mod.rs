//! The system-call layer.
//!
//! User code raises the syscall vector with the call number and its
//! arguments laid out on its own stack from the saved ESP. Nothing on
//! that stack is trusted: every fetch goes through the checked copy
//! helpers, and a bad pointer during argument fetch kills the process
//! with exit code -1. All other failures are value-returned as -1 in
//! EAX.
//!
//! The numbering is fixed ABI; user binaries bake these constants in.

mod file;
mod mm;
mod proc;
mod sync;
mod thread;

use osprey_frame::cpu::UserContext;

use crate::prelude::*;
use crate::process::{self, Process};
use crate::thread::ctx_of;
use crate::util;

pub const SYS_HALT: u32 = 0;
pub const SYS_EXIT: u32 = 1;
pub const SYS_EXEC: u32 = 2;
pub const SYS_WAIT: u32 = 3;
pub const SYS_FORK: u32 = 4;
pub const SYS_CREATE: u32 = 5;
pub const SYS_REMOVE: u32 = 6;
pub const SYS_OPEN: u32 = 7;
pub const SYS_FILESIZE: u32 = 8;
pub const SYS_READ: u32 = 9;
pub const SYS_WRITE: u32 = 10;
pub const SYS_SEEK: u32 = 11;
pub const SYS_TELL: u32 = 12;
pub const SYS_CLOSE: u32 = 13;
pub const SYS_PRACTICE: u32 = 14;
pub const SYS_COMPUTE_E: u32 = 15;
pub const SYS_PT_CREATE: u32 = 16;
pub const SYS_PT_EXIT: u32 = 17;
pub const SYS_PT_JOIN: u32 = 18;
pub const SYS_LOCK_INIT: u32 = 19;
pub const SYS_LOCK_ACQUIRE: u32 = 20;
pub const SYS_LOCK_RELEASE: u32 = 21;
pub const SYS_SEMA_INIT: u32 = 22;
pub const SYS_SEMA_UP: u32 = 23;
pub const SYS_SEMA_DOWN: u32 = 24;
pub const SYS_GET_TID: u32 = 25;
pub const SYS_MKDIR: u32 = 26;
pub const SYS_CHDIR: u32 = 27;
pub const SYS_READDIR: u32 = 28;
pub const SYS_ISDIR: u32 = 29;
pub const SYS_INUMBER: u32 = 30;
pub const SYS_SYMLINK: u32 = 31;
pub const SYS_READLINK: u32 = 32;
pub const SYS_MMAP: u32 = 33;
pub const SYS_MUNMAP: u32 = 34;

/// Entry from the user-mode loop on every syscall trap. Sets EAX to
/// the handler's result; a fault while touching user memory takes the
/// process down instead.
pub fn handle_syscall(process: &Arc<Process>, ctx: &mut UserContext) {
    // The page-fault path consults the trapped user ESP for the stack
    // growth heuristic while we copy arguments.
    if let Some(task) = crate::thread::current_ctx() {
        if let Some(thread_ctx) = ctx_of(&task) {
            thread_ctx.set_user_esp(ctx.esp as usize);
        }
    }

    match dispatch(process, ctx) {
        Ok(value) => ctx.eax = value as u32,
        Err(err) if err.error() == Errno::EFAULT => {
            // A pointer the paging layer could not make good: the
            // process dies, per the ABI.
            process::exit_process(process, process::KILLED_EXIT_CODE);
        }
        Err(err) => {
            trace!("syscall failed: {:?}", err);
            ctx.eax = (-1i32) as u32;
        }
    }
}

fn dispatch(process: &Arc<Process>, ctx: &mut UserContext) -> Result<i32> {
    let esp = ctx.esp as usize;
    let num = util::read_u32_from_user(esp)?;
    let arg = |i: usize| -> Result<u32> { util::read_u32_from_user(esp + 4 * (i + 1)) };

    match num {
        SYS_HALT => proc::sys_halt(),
        SYS_EXIT => proc::sys_exit(process, arg(0)? as i32),
        SYS_EXEC => proc::sys_exec(process, arg(0)? as usize),
        SYS_WAIT => proc::sys_wait(process, arg(0)?),
        SYS_FORK => proc::sys_fork(process, ctx),
        SYS_CREATE => file::sys_create(process, arg(0)? as usize, arg(1)? as usize),
        SYS_REMOVE => file::sys_remove(process, arg(0)? as usize),
        SYS_OPEN => file::sys_open(process, arg(0)? as usize),
        SYS_FILESIZE => file::sys_filesize(process, arg(0)? as i32),
        SYS_READ => file::sys_read(process, arg(0)? as i32, arg(1)? as usize, arg(2)? as usize),
        SYS_WRITE => file::sys_write(process, arg(0)? as i32, arg(1)? as usize, arg(2)? as usize),
        SYS_SEEK => file::sys_seek(process, arg(0)? as i32, arg(1)? as usize),
        SYS_TELL => file::sys_tell(process, arg(0)? as i32),
        SYS_CLOSE => file::sys_close(process, arg(0)? as i32),
        SYS_PRACTICE => proc::sys_practice(arg(0)? as i32),
        SYS_COMPUTE_E => proc::sys_compute_e(arg(0)? as i32),
        SYS_PT_CREATE => thread::sys_pt_create(process, arg(0)? as usize, arg(1)?),
        SYS_PT_EXIT => thread::sys_pt_exit(),
        SYS_PT_JOIN => thread::sys_pt_join(process, arg(0)?),
        SYS_LOCK_INIT => sync::sys_lock_init(process, arg(0)? as usize),
        SYS_LOCK_ACQUIRE => sync::sys_lock_acquire(process, arg(0)? as usize),
        SYS_LOCK_RELEASE => sync::sys_lock_release(process, arg(0)? as usize),
        SYS_SEMA_INIT => sync::sys_sema_init(process, arg(0)? as usize, arg(1)? as usize),
        SYS_SEMA_UP => sync::sys_sema_up(process, arg(0)? as usize),
        SYS_SEMA_DOWN => sync::sys_sema_down(process, arg(0)? as usize),
        SYS_GET_TID => thread::sys_get_tid(),
        SYS_MKDIR => file::sys_mkdir(process, arg(0)? as usize),
        SYS_CHDIR => file::sys_chdir(process, arg(0)? as usize),
        SYS_READDIR => file::sys_readdir(process, arg(0)? as i32, arg(1)? as usize),
        SYS_ISDIR => file::sys_isdir(process, arg(0)? as i32),
        SYS_INUMBER => file::sys_inumber(process, arg(0)? as i32),
        SYS_SYMLINK => file::sys_symlink(process, arg(0)? as usize, arg(1)? as usize),
        SYS_READLINK => {
            file::sys_readlink(process, arg(0)? as usize, arg(1)? as usize, arg(2)? as usize)
        }
        SYS_MMAP => mm::sys_mmap(process, arg(0)? as i32, arg(1)? as usize),
        SYS_MUNMAP => mm::sys_munmap(process, arg(0)?),
        unknown => {
            warn!("unimplemented syscall number {}", unknown);
            return_errno!(Errno::ENOSYS)
        }
    }
}
