//! User-visible locks and semaphores.
//!
//! `lock_init`/`sema_init` store a kernel-assigned id into the user's
//! object; the later calls read that id back. The objects are the
//! frame's primitives, so priority donation works across user locks.

use crate::prelude::*;
use crate::process::Process;
use crate::util;

fn current_tid() -> u32 {
    osprey_frame::task::current_task()
        .expect("syscall without a task")
        .tid()
}

pub fn sys_lock_init(process: &Arc<Process>, lock_addr: Vaddr) -> Result<i32> {
    let id = process.user_sync().lock_create()?;
    util::write_u32_to_user(lock_addr, id)?;
    debug!("lock_init -> {}", id);
    Ok(0)
}

pub fn sys_lock_acquire(process: &Arc<Process>, lock_addr: Vaddr) -> Result<i32> {
    let id = util::read_u32_from_user(lock_addr)?;
    process.user_sync().lock_acquire(id, current_tid())?;
    Ok(0)
}

pub fn sys_lock_release(process: &Arc<Process>, lock_addr: Vaddr) -> Result<i32> {
    let id = util::read_u32_from_user(lock_addr)?;
    process.user_sync().lock_release(id, current_tid())?;
    Ok(0)
}

pub fn sys_sema_init(process: &Arc<Process>, sema_addr: Vaddr, value: usize) -> Result<i32> {
    let id = process.user_sync().sema_create(value)?;
    util::write_u32_to_user(sema_addr, id)?;
    debug!("sema_init({}) -> {}", value, id);
    Ok(0)
}

pub fn sys_sema_up(process: &Arc<Process>, sema_addr: Vaddr) -> Result<i32> {
    let id = util::read_u32_from_user(sema_addr)?;
    process.user_sync().sema_up(id)?;
    Ok(0)
}

pub fn sys_sema_down(process: &Arc<Process>, sema_addr: Vaddr) -> Result<i32> {
    let id = util::read_u32_from_user(sema_addr)?;
    process.user_sync().sema_down(id)?;
    Ok(0)
}
