#![allow(unused)]

use log::Level;

pub const PAGE_SIZE: usize = 0x1000;
pub const PAGE_SIZE_BITS: usize = 0xc;

/// The kernel lives in the upper gigabyte.
pub const KERNEL_OFFSET: usize = 0xC000_0000;

/// Physical memory is linearly mapped at `KERNEL_OFFSET`, up to this
/// much; RAM beyond it is left unused.
pub const PHYS_MAP_LIMIT: usize = 0x0400_0000;

/// One page of kernel stack per task, plus its canary word.
pub const KERNEL_STACK_SIZE: usize = PAGE_SIZE;

pub const USER_STACK_TOP: usize = KERNEL_OFFSET;
pub const USER_STACK_SIZE: usize = PAGE_SIZE * 4;

pub const KERNEL_HEAP_SIZE: usize = 0x40_0000;

/// Timer interrupts per second.
pub const TIMER_FREQ: u64 = 100;
/// A thread is preempted after this many ticks.
pub const TIME_SLICE_TICKS: u64 = 4;

pub const DEFAULT_LOG_LEVEL: Level = Level::Warn;
