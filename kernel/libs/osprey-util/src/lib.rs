//! Small self-contained utilities shared by the Osprey kernel crates.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod crc32;
pub mod fixed_point;
pub mod recycle_allocator;

pub use crc32::crc32;
pub use fixed_point::Fixed;
pub use recycle_allocator::RecycleAllocator;
