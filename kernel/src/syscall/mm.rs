use crate::prelude::*;
use crate::process::Process;
use crate::vm::mmap;

pub fn sys_mmap(process: &Arc<Process>, fd: i32, addr: Vaddr) -> Result<i32> {
    debug!("mmap(fd {}, addr {:#x})", fd, addr);
    let file = process.fds().lock().get_file(fd)?;
    let mid = mmap::mmap(process, file, addr)?;
    Ok(mid as i32)
}

pub fn sys_munmap(process: &Arc<Process>, mid: u32) -> Result<i32> {
    debug!("munmap({})", mid);
    mmap::munmap(process, mid)?;
    Ok(0)
}
