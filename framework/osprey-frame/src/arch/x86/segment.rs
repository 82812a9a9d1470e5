//! The GDT and the TSS.
//!
//! Six segments: null, flat kernel code/data, flat user code/data, and
//! one TSS whose `esp0` points at the running task's kernel stack so
//! ring-3 traps land somewhere sane.

use core::cell::UnsafeCell;

pub const KERNEL_CS: u16 = 0x08;
pub const KERNEL_DS: u16 = 0x10;
pub const USER_CS: u16 = 0x1B; // selector 0x18, RPL 3
pub const USER_DS: u16 = 0x23; // selector 0x20, RPL 3
const TSS_SELECTOR: u16 = 0x28;

#[repr(C, packed)]
struct Tss {
    link: u32,
    esp0: u32,
    ss0: u32,
    // The hardware task-switch fields below are never used; traps only
    // consume esp0/ss0.
    rest: [u32; 22],
    iopb: u32,
}

const_assert_eq!(core::mem::size_of::<Tss>(), 104);

struct TssCell(UnsafeCell<Tss>);

// Single CPU; mutated only with interrupts disabled.
unsafe impl Sync for TssCell {}

static TSS: TssCell = TssCell(UnsafeCell::new(Tss {
    link: 0,
    esp0: 0,
    ss0: KERNEL_DS as u32,
    rest: [0; 22],
    iopb: (104 << 16), // I/O map base beyond the limit: no port access
}));

struct GdtCell(UnsafeCell<[u64; 6]>);

unsafe impl Sync for GdtCell {}

static GDT: GdtCell = GdtCell(UnsafeCell::new([
    0,
    0x00CF9A000000FFFF, // kernel code: flat, ring 0, execute/read
    0x00CF92000000FFFF, // kernel data: flat, ring 0, read/write
    0x00CFFA000000FFFF, // user code: flat, ring 3
    0x00CFF2000000FFFF, // user data: flat, ring 3
    0,                  // TSS, filled at init
]));

#[repr(C, packed)]
struct DescriptorPointer {
    limit: u16,
    base: u32,
}

pub(crate) fn init() {
    unsafe {
        let gdt = &mut *GDT.0.get();
        let tss_base = TSS.0.get() as u32;
        let tss_limit = (core::mem::size_of::<Tss>() - 1) as u32;
        // 32-bit available TSS, byte granular.
        gdt[5] = ((tss_base as u64 & 0xFF00_0000) << 32)
            | (0x89u64 << 40)
            | ((tss_base as u64 & 0x00FF_FFFF) << 16)
            | tss_limit as u64;

        let pointer = DescriptorPointer {
            limit: (core::mem::size_of::<[u64; 6]>() - 1) as u16,
            base: gdt.as_ptr() as u32,
        };
        core::arch::asm!(
            "lgdt [{ptr}]",
            // Reload CS with a far jump, then the data segments.
            "push {cs}",
            "lea {tmp}, [2f]",
            "push {tmp}",
            "retf",
            "2:",
            "mov ds, {ds:x}",
            "mov es, {ds:x}",
            "mov ss, {ds:x}",
            "mov fs, {ds:x}",
            "mov gs, {ds:x}",
            "ltr {tss:x}",
            ptr = in(reg) &pointer,
            cs = in(reg) KERNEL_CS as u32,
            ds = in(reg) KERNEL_DS as u32,
            tss = in(reg) TSS_SELECTOR,
            tmp = out(reg) _,
        );
    }
}

/// Points ring-0 trap entry at the top of the running task's kernel
/// stack. Called with interrupts disabled on every switch to a task
/// that may enter user mode.
pub(crate) fn set_kernel_stack(esp0: usize) {
    unsafe {
        (*TSS.0.get()).esp0 = esp0 as u32;
    }
}
