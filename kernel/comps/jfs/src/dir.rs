//! Directories.
//!
//! A directory is a file of fixed 20-byte entries: an inode sector, a
//! 14-character name, and an in-use flag. Every directory carries `.`
//! and `..`. Entry creation reuses the first free slot before growing
//! the file; creation and removal happen under the caller's transaction.

use bytemuck_derive::{Pod as DerivePod, Zeroable as DeriveZeroable};
use static_assertions::const_assert_eq;

use crate::inode::Inode;
use crate::prelude::*;
use crate::wal::Txn;

/// The longest representable entry name.
pub const NAME_MAX: usize = 14;

const ENTRY_SIZE: usize = 20;

#[repr(C)]
#[derive(Clone, Copy, DerivePod, DeriveZeroable)]
struct RawEntry {
    inumber: u32,
    name: [u8; NAME_MAX],
    in_use: u8,
    reserved: u8,
}

const_assert_eq!(core::mem::size_of::<RawEntry>(), ENTRY_SIZE);

impl RawEntry {
    fn new(name: &str, inumber: Sid) -> Self {
        let mut raw = RawEntry {
            inumber,
            name: [0; NAME_MAX],
            in_use: 1,
            reserved: 0,
        };
        raw.name[..name.len()].copy_from_slice(name.as_bytes());
        raw
    }

    fn name_str(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_MAX);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }
}

/// A live directory entry, as `readdir` reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub inumber: u32,
}

/// A view of an inode as a directory.
pub(crate) struct Dir {
    inode: Arc<Inode>,
}

impl Dir {
    pub(crate) fn new(inode: Arc<Inode>) -> Result<Self> {
        if !inode.is_dir() {
            return_errno!(Errno::NotDir);
        }
        Ok(Dir { inode })
    }

    pub(crate) fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    fn entry_count(&self) -> usize {
        self.inode.length() / ENTRY_SIZE
    }

    fn read_entry(&self, idx: usize) -> Result<RawEntry> {
        let mut buf = [0u8; ENTRY_SIZE];
        let n = self.inode.read_at(idx * ENTRY_SIZE, &mut buf)?;
        debug_assert_eq!(n, ENTRY_SIZE);
        Ok(*bytemuck::from_bytes(&buf))
    }

    /// Finds `name`, returning its inode sector.
    pub(crate) fn lookup(&self, name: &str) -> Result<Sid> {
        for idx in 0..self.entry_count() {
            let entry = self.read_entry(idx)?;
            if entry.in_use != 0 && entry.name_str() == name {
                return Ok(entry.inumber);
            }
        }
        return_errno!(Errno::NotFound)
    }

    /// Adds an entry under `txn`, reusing a free slot if one exists.
    pub(crate) fn add(&self, txn: &mut Txn, name: &str, inumber: Sid) -> Result<()> {
        if name.is_empty() {
            return_errno!(Errno::InvalidArgs);
        }
        if name.len() > NAME_MAX {
            return_errno!(Errno::NameTooLong);
        }
        let mut free_slot = None;
        for idx in 0..self.entry_count() {
            let entry = self.read_entry(idx)?;
            if entry.in_use != 0 {
                if entry.name_str() == name {
                    return_errno!(Errno::Exists);
                }
            } else if free_slot.is_none() {
                free_slot = Some(idx);
            }
        }
        let idx = free_slot.unwrap_or_else(|| self.entry_count());
        let raw = RawEntry::new(name, inumber);
        let written = self
            .inode
            .write_at(txn, idx * ENTRY_SIZE, bytemuck::bytes_of(&raw))?;
        if written != ENTRY_SIZE {
            return_errno_with_message!(Errno::NoSpace, "directory cannot grow");
        }
        Ok(())
    }

    /// Removes `name` under `txn`, returning the inode sector it named.
    pub(crate) fn remove(&self, txn: &mut Txn, name: &str) -> Result<Sid> {
        for idx in 0..self.entry_count() {
            let mut entry = self.read_entry(idx)?;
            if entry.in_use != 0 && entry.name_str() == name {
                entry.in_use = 0;
                let inumber = entry.inumber;
                self.inode
                    .write_at(txn, idx * ENTRY_SIZE, bytemuck::bytes_of(&entry))?;
                return Ok(inumber);
            }
        }
        return_errno!(Errno::NotFound)
    }

    /// The live entry at position `idx`, if any. `readdir` cursors over
    /// these indices; `.` and `..` are reported like any other entry.
    pub(crate) fn entry_at(&self, idx: usize) -> Result<Option<DirEntryInfo>> {
        if idx >= self.entry_count() {
            return Ok(None);
        }
        let entry = self.read_entry(idx)?;
        if entry.in_use == 0 {
            return Ok(Some(DirEntryInfo {
                name: String::new(),
                inumber: 0,
            }));
        }
        Ok(Some(DirEntryInfo {
            name: entry.name_str().to_string(),
            inumber: entry.inumber,
        }))
    }

    /// Whether the directory holds nothing besides `.` and `..`.
    pub(crate) fn is_empty(&self) -> Result<bool> {
        for idx in 0..self.entry_count() {
            let entry = self.read_entry(idx)?;
            if entry.in_use != 0 {
                let name = entry.name_str();
                if name != "." && name != ".." {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

/// Writes the `.` and `..` entries of a fresh directory inode. The
/// inode may still be staged, uncommitted, in `txn`, so this does not go
/// through [`Dir`] (whose type check reads committed state).
pub(crate) fn write_dots(inode: &Arc<Inode>, txn: &mut Txn, parent: Sid) -> Result<()> {
    let dot = RawEntry::new(".", inode.inumber());
    let dotdot = RawEntry::new("..", parent);
    inode.write_at(txn, 0, bytemuck::bytes_of(&dot))?;
    inode.write_at(txn, ENTRY_SIZE, bytemuck::bytes_of(&dotdot))?;
    Ok(())
}
