//! Fault-tolerant memory copy used for user pointers.
//!
//! The copy loop sits between two known labels. When a page fault in
//! kernel mode lands inside that window and the supplemental page table
//! cannot satisfy it, the trap handler rewrites the saved EIP to the
//! fixup label, which makes `__copy_user` return failure instead of
//! taking the kernel down.

use super::idt::TrapFrame;

core::arch::global_asm!(
    r#"
    .section .text
    .global __copy_user
    .global __usercopy_start
    .global __usercopy_end
    .global __usercopy_fault
__copy_user:                # (dst: u32, src: u32, len: u32) -> u32 (0 ok, 1 fault)
    push esi
    push edi
    mov edi, [esp + 12]
    mov esi, [esp + 16]
    mov ecx, [esp + 20]
    cld
__usercopy_start:
    rep movsb
__usercopy_end:
    xor eax, eax
    jmp 3f
__usercopy_fault:
    mov eax, 1
3:
    pop edi
    pop esi
    ret
    "#
);

extern "C" {
    fn __copy_user(dst: u32, src: u32, len: u32) -> u32;
    static __usercopy_start: u8;
    static __usercopy_end: u8;
    static __usercopy_fault: u8;
}

/// Copies `len` bytes between `dst` and `src`, either of which may be
/// an unverified user address. Returns `Err(())` if a page fault could
/// not be resolved along the way.
///
/// # Safety
///
/// The kernel-side address must be valid for `len` bytes. The user-side
/// address may be anything; faults are caught.
pub unsafe fn copy_user_raw(dst: usize, src: usize, len: usize) -> Result<(), ()> {
    if len == 0 {
        return Ok(());
    }
    if __copy_user(dst as u32, src as u32, len as u32) == 0 {
        Ok(())
    } else {
        Err(())
    }
}

/// Rewrites a faulting copy to its failure path. Returns false when the
/// fault did not come from the copy window.
pub(crate) fn try_fixup(tf: &mut TrapFrame) -> bool {
    let eip = tf.eip as usize;
    let start = unsafe { &__usercopy_start as *const u8 as usize };
    let end = unsafe { &__usercopy_end as *const u8 as usize };
    if eip >= start && eip < end {
        tf.eip = unsafe { &__usercopy_fault as *const u8 as usize } as u32;
        true
    } else {
        false
    }
}
