use osprey_jfs::NAME_MAX;

use crate::fs;
use crate::prelude::*;
use crate::process::{FdEntry, Process};
use crate::util;

/// User I/O moves through a kernel bounce buffer this big at a time.
const IO_CHUNK: usize = 4096;

pub fn sys_create(process: &Arc<Process>, path_addr: Vaddr, initial_size: usize) -> Result<i32> {
    let path = util::read_cstring_from_user(path_addr, util::MAX_USER_STR)?;
    debug!("create(\"{}\", {})", path, initial_size);
    fs::jfs().create(&process.cwd(), &path, initial_size)?;
    Ok(0)
}

pub fn sys_remove(process: &Arc<Process>, path_addr: Vaddr) -> Result<i32> {
    let path = util::read_cstring_from_user(path_addr, util::MAX_USER_STR)?;
    debug!("remove(\"{}\")", path);
    fs::jfs().remove(&process.cwd(), &path)?;
    Ok(0)
}

pub fn sys_open(process: &Arc<Process>, path_addr: Vaddr) -> Result<i32> {
    let path = util::read_cstring_from_user(path_addr, util::MAX_USER_STR)?;
    debug!("open(\"{}\")", path);
    let handle = fs::jfs().open(&process.cwd(), &path)?;
    let fd = process.fds().lock().alloc(FdEntry::File(handle))?;
    Ok(fd)
}

pub fn sys_filesize(process: &Arc<Process>, fd: i32) -> Result<i32> {
    let file = process.fds().lock().get_file(fd)?;
    Ok(file.size() as i32)
}

pub fn sys_read(process: &Arc<Process>, fd: i32, buf_addr: Vaddr, len: usize) -> Result<i32> {
    trace!("read(fd {}, len {})", fd, len);
    let entry = process.fds().lock().get(fd)?;
    match entry {
        FdEntry::Console => {
            // No keyboard on this machine; standard input is empty.
            Ok(0)
        }
        FdEntry::File(file) => {
            if file.is_dir() {
                return_errno!(Errno::EISDIR);
            }
            let mut done = 0;
            while done < len {
                let chunk = (len - done).min(IO_CHUNK);
                let mut buf = vec![0u8; chunk];
                let got = file.read(&mut buf)?;
                if got == 0 {
                    break;
                }
                util::write_bytes_to_user(buf_addr + done, &buf[..got])?;
                done += got;
                if got < chunk {
                    break;
                }
            }
            Ok(done as i32)
        }
    }
}

pub fn sys_write(process: &Arc<Process>, fd: i32, buf_addr: Vaddr, len: usize) -> Result<i32> {
    trace!("write(fd {}, len {})", fd, len);
    let entry = process.fds().lock().get(fd)?;
    match entry {
        FdEntry::Console => {
            let mut done = 0;
            while done < len {
                let chunk = (len - done).min(IO_CHUNK);
                let buf = util::read_bytes_from_user(buf_addr + done, chunk)?;
                fs::write_console(&buf);
                done += chunk;
            }
            Ok(len as i32)
        }
        FdEntry::File(file) => {
            if file.is_dir() {
                return_errno!(Errno::EISDIR);
            }
            let mut done = 0;
            while done < len {
                let chunk = (len - done).min(IO_CHUNK);
                let buf = util::read_bytes_from_user(buf_addr + done, chunk)?;
                let put = file.write(&buf)?;
                done += put;
                if put < chunk {
                    break;
                }
            }
            Ok(done as i32)
        }
    }
}

pub fn sys_seek(process: &Arc<Process>, fd: i32, pos: usize) -> Result<i32> {
    let file = process.fds().lock().get_file(fd)?;
    file.seek(pos);
    Ok(0)
}

pub fn sys_tell(process: &Arc<Process>, fd: i32) -> Result<i32> {
    let file = process.fds().lock().get_file(fd)?;
    Ok(file.tell() as i32)
}

pub fn sys_close(process: &Arc<Process>, fd: i32) -> Result<i32> {
    debug!("close({})", fd);
    process.fds().lock().close(fd)?;
    Ok(0)
}

pub fn sys_mkdir(process: &Arc<Process>, path_addr: Vaddr) -> Result<i32> {
    let path = util::read_cstring_from_user(path_addr, util::MAX_USER_STR)?;
    debug!("mkdir(\"{}\")", path);
    fs::jfs().mkdir(&process.cwd(), &path)?;
    Ok(0)
}

pub fn sys_chdir(process: &Arc<Process>, path_addr: Vaddr) -> Result<i32> {
    let path = util::read_cstring_from_user(path_addr, util::MAX_USER_STR)?;
    debug!("chdir(\"{}\")", path);
    let dir = fs::jfs().open_dir(&process.cwd(), &path)?;
    process.set_cwd(dir);
    Ok(0)
}

/// Writes the next entry name (NUL-terminated, at most `NAME_MAX`
/// bytes plus the NUL) into the user buffer; 1 on success, 0 at end.
pub fn sys_readdir(process: &Arc<Process>, fd: i32, name_addr: Vaddr) -> Result<i32> {
    let file = process.fds().lock().get_file(fd)?;
    match file.readdir()? {
        Some(entry) => {
            let mut buf = [0u8; NAME_MAX + 1];
            buf[..entry.name.len()].copy_from_slice(entry.name.as_bytes());
            util::write_bytes_to_user(name_addr, &buf[..entry.name.len() + 1])?;
            Ok(1)
        }
        None => Ok(0),
    }
}

pub fn sys_isdir(process: &Arc<Process>, fd: i32) -> Result<i32> {
    let file = process.fds().lock().get_file(fd)?;
    Ok(file.is_dir() as i32)
}

pub fn sys_inumber(process: &Arc<Process>, fd: i32) -> Result<i32> {
    let file = process.fds().lock().get_file(fd)?;
    Ok(file.inode().inumber() as i32)
}

pub fn sys_symlink(process: &Arc<Process>, target_addr: Vaddr, link_addr: Vaddr) -> Result<i32> {
    let target = util::read_cstring_from_user(target_addr, util::MAX_USER_STR)?;
    let linkpath = util::read_cstring_from_user(link_addr, util::MAX_USER_STR)?;
    debug!("symlink(\"{}\" -> \"{}\")", linkpath, target);
    fs::jfs().symlink(&process.cwd(), &target, &linkpath)?;
    Ok(0)
}

/// Copies the link target (unterminated, like the POSIX call) into the
/// user buffer and returns the number of bytes placed there.
pub fn sys_readlink(
    process: &Arc<Process>,
    path_addr: Vaddr,
    buf_addr: Vaddr,
    buf_len: usize,
) -> Result<i32> {
    let path = util::read_cstring_from_user(path_addr, util::MAX_USER_STR)?;
    let target = fs::jfs().readlink(&process.cwd(), &path)?;
    let n = target.len().min(buf_len);
    util::write_bytes_to_user(buf_addr, &target.as_bytes()[..n])?;
    Ok(n as i32)
}
