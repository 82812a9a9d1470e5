//! Reading and writing user memory from system-call handlers.
//!
//! Nothing here trusts a user pointer. The frame's fault-tolerant copy
//! fails cleanly on addresses that the paging layer cannot satisfy, and
//! every failure surfaces as `EFAULT`; the dispatcher turns that into
//! the process's death, per the ABI.

use osprey_frame::vm;

use crate::prelude::*;

/// The longest C string a system call will pull from user space.
pub const MAX_USER_STR: usize = 4096;

/// Reads a `u32` from user memory.
pub fn read_u32_from_user(addr: Vaddr) -> Result<u32> {
    let mut bytes = [0u8; 4];
    vm::copy_from_user(&mut bytes, addr)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Writes a `u32` into user memory.
pub fn write_u32_to_user(addr: Vaddr, val: u32) -> Result<()> {
    vm::copy_to_user(addr, &val.to_le_bytes())?;
    Ok(())
}

/// Reads `len` bytes from user memory into a fresh buffer.
pub fn read_bytes_from_user(addr: Vaddr, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    vm::copy_from_user(&mut buf, addr)?;
    Ok(buf)
}

/// Writes a byte slice into user memory.
pub fn write_bytes_to_user(addr: Vaddr, bytes: &[u8]) -> Result<()> {
    vm::copy_to_user(addr, bytes)?;
    Ok(())
}

/// Reads a NUL-terminated string of at most `max_len` bytes. Walks one
/// page at a time so an unterminated string fails at its first unmapped
/// page rather than dragging in arbitrary memory.
pub fn read_cstring_from_user(addr: Vaddr, max_len: usize) -> Result<String> {
    let mut collected: Vec<u8> = Vec::new();
    let mut at = addr;
    while collected.len() < max_len {
        // Stop each chunk at the next page boundary.
        let page_left = PAGE_SIZE - (at % PAGE_SIZE);
        let chunk_len = page_left.min(max_len - collected.len());
        let mut chunk = vec![0u8; chunk_len];
        vm::copy_from_user(&mut chunk, at)?;
        if let Some(nul) = chunk.iter().position(|&b| b == 0) {
            collected.extend_from_slice(&chunk[..nul]);
            return String::from_utf8(collected)
                .map_err(|_| Error::with_message(Errno::EINVAL, "string is not UTF-8"));
        }
        collected.extend_from_slice(&chunk);
        at += chunk_len;
    }
    return_errno_with_message!(Errno::EINVAL, "unterminated user string")
}
