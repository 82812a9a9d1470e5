use crate::prelude::*;
use crate::process::{self, Process};

pub fn sys_pt_create(process: &Arc<Process>, entry: Vaddr, arg: u32) -> Result<i32> {
    debug!("pt_create(entry {:#x})", entry);
    if entry == 0 || entry >= osprey_frame::config::KERNEL_OFFSET {
        return_errno!(Errno::EINVAL);
    }
    let tid = process::create_user_thread(process, entry, arg)?;
    Ok(tid as i32)
}

pub fn sys_pt_exit() -> Result<i32> {
    debug!("pt_exit");
    process::exit_thread();
}

pub fn sys_pt_join(process: &Arc<Process>, tid: u32) -> Result<i32> {
    debug!("pt_join({})", tid);
    process::join_thread(process, tid)?;
    Ok(tid as i32)
}

pub fn sys_get_tid() -> Result<i32> {
    let task = osprey_frame::task::current_task().expect("syscall without a task");
    Ok(task.tid() as i32)
}
