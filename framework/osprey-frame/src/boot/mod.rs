//! Boot information: the memory map and the kernel command line.

pub mod kcmdline;

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use spin::Once;

pub use crate::arch::boot::MemoryRegion;
pub use kcmdline::{KCmdlineArg, SchedulerKind};

static CMDLINE: Once<String> = Once::new();
static REGIONS: Once<Vec<MemoryRegion>> = Once::new();

pub(crate) fn init() {
    CMDLINE.call_once(|| crate::arch::boot::raw_cmdline().to_string());
    REGIONS.call_once(crate::arch::boot::usable_regions);
}

pub(crate) fn regions() -> &'static [MemoryRegion] {
    REGIONS.get().map(|v| v.as_slice()).unwrap_or(&[])
}

/// The parsed kernel command line.
pub fn kcmdline() -> KCmdlineArg {
    KCmdlineArg::from(CMDLINE.get().map(|s| s.as_str()).unwrap_or(""))
}
