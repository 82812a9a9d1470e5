//! The Osprey journaling file system.
//!
//! A crash-consistent file system over a 512-byte-sector block device:
//! a fixed-size buffer cache with clock eviction and read-ahead, a
//! write-ahead log of before/after sector images giving transaction
//! atomicity, one-sector indexed inodes (123 direct, one indirect, one
//! doubly indirect pointer), hierarchical directories and symlinks.
//!
//! The crate runs in two worlds. In the kernel it sits on the frame's
//! sleeping locks and kernel threads; on the host it runs against
//! `std::sync` and an in-memory disk so the whole stack, recovery
//! included, is exercised by `cargo test`. The `os` module is the seam.

#![cfg_attr(target_os = "none", no_std)]
#![deny(unsafe_code)]

extern crate alloc;

mod bcache;
mod dir;
mod error;
mod free_map;
mod fs;
mod inode;
mod os;
mod path;
mod prelude;
mod wal;

pub use bcache::BufferCache;
pub use dir::{DirEntryInfo, NAME_MAX};
pub use error::{Errno, Error, Result};
pub use fs::{FileHandle, Jfs, MountOptions};
pub use inode::Inode;
pub use wal::Wal;
