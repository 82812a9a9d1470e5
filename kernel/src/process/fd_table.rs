//! The per-process file-descriptor table.

use osprey_jfs::FileHandle;

use crate::prelude::*;

/// Descriptors 0 and 1 are wired to the console; the harness's test
/// programs expect exactly that.
pub const STDIN_FD: i32 = 0;
pub const STDOUT_FD: i32 = 1;

const FD_MAX: usize = 128;

#[derive(Clone)]
pub enum FdEntry {
    Console,
    File(Arc<FileHandle>),
}

pub struct FdTable {
    slots: Vec<Option<FdEntry>>,
}

impl FdTable {
    /// A fresh table with the standard descriptors preopened.
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(8);
        slots.push(Some(FdEntry::Console));
        slots.push(Some(FdEntry::Console));
        FdTable { slots }
    }

    /// Places `entry` in the lowest free slot.
    pub fn alloc(&mut self, entry: FdEntry) -> Result<i32> {
        for (fd, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(entry);
                return Ok(fd as i32);
            }
        }
        if self.slots.len() >= FD_MAX {
            return_errno_with_message!(Errno::EMFILE, "file descriptor table full");
        }
        self.slots.push(Some(entry));
        Ok((self.slots.len() - 1) as i32)
    }

    pub fn get(&self, fd: i32) -> Result<FdEntry> {
        if fd < 0 {
            return_errno!(Errno::EBADF);
        }
        self.slots
            .get(fd as usize)
            .and_then(|slot| slot.clone())
            .ok_or(Error::new(Errno::EBADF))
    }

    /// Like `get`, but only for real files.
    pub fn get_file(&self, fd: i32) -> Result<Arc<FileHandle>> {
        match self.get(fd)? {
            FdEntry::File(file) => Ok(file),
            FdEntry::Console => Err(Error::new(Errno::EBADF)),
        }
    }

    pub fn close(&mut self, fd: i32) -> Result<()> {
        if fd < 0 {
            return_errno!(Errno::EBADF);
        }
        let slot = self
            .slots
            .get_mut(fd as usize)
            .ok_or(Error::new(Errno::EBADF))?;
        if slot.take().is_none() {
            return_errno!(Errno::EBADF);
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// A duplicate table for fork; open files share offsets through
    /// the shared handles.
    pub fn duplicate(&self) -> FdTable {
        FdTable {
            slots: self.slots.clone(),
        }
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}
