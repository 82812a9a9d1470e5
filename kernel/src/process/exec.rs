//! Loading an executable into a fresh address space.
//!
//! The loader reads only the ELF headers. Each `PT_LOAD` segment turns
//! into file-backed supplemental-page-table entries (with a zero-fill
//! tail for the BSS); no data page is touched until the program faults
//! on it. The first stack page is the one eager allocation, so the
//! argv block can be written before the first iret.

use osprey_frame::cpu::UserContext;
use xmas_elf::header;
use xmas_elf::program::{self, ProgramHeader};
use xmas_elf::ElfFile;

use crate::prelude::*;
use crate::process::Process;
use crate::util;
use crate::vm::spt::{FileOrigin, WritebackPolicy};
use crate::vm::USER_STACK_TOP;

/// Headers are expected inside the file's first pages.
const HEADER_READ_MAX: usize = 16 * 4096;

pub(super) fn load_program(
    process: &Arc<Process>,
    argv: &[String],
    ctx: &mut UserContext,
) -> Result<()> {
    let file = crate::fs::jfs().open(&process.cwd(), &argv[0])?;
    if file.is_dir() {
        return_errno!(Errno::EISDIR);
    }

    let header_len = file.size().min(HEADER_READ_MAX);
    let mut header_buf = vec![0u8; header_len];
    let got = file.read_at(0, &mut header_buf)?;
    let elf = ElfFile::new(&header_buf[..got])
        .map_err(|_| Error::with_message(Errno::ENOENT, "not an ELF image"))?;

    if elf.header.pt1.class() != header::Class::ThirtyTwo
        || elf.header.pt2.machine().as_machine() != header::Machine::X86
        || elf.header.pt2.type_().as_type() != header::Type::Executable
    {
        return_errno_with_message!(Errno::ENOENT, "not a 32-bit x86 executable");
    }

    for ph in elf.program_iter() {
        let ProgramHeader::Ph32(ph) = ph else {
            return_errno!(Errno::ENOENT);
        };
        if ph.get_type() != Ok(program::Type::Load) {
            continue;
        }
        install_segment(
            process,
            &file,
            ph.offset as usize,
            ph.virtual_addr as usize,
            ph.file_size as usize,
            ph.mem_size as usize,
            ph.flags.is_write(),
        )?;
    }

    // The executable stays open and write-denied while we live.
    process.set_executable(file);

    // The stack's first page is materialised eagerly; deeper pages
    // arrive through the growth path.
    let first_stack_page = USER_STACK_TOP - PAGE_SIZE;
    process.spt().install_zero(first_stack_page, true)?;
    process.spt().load(process, first_stack_page)?;

    ctx.eip = elf.header.pt2.entry_point() as u32;
    ctx.esp = build_argv_stack(argv)? as u32;
    Ok(())
}

/// Registers the pages of one `PT_LOAD` segment.
fn install_segment(
    process: &Arc<Process>,
    file: &Arc<osprey_jfs::FileHandle>,
    offset: usize,
    vaddr: usize,
    file_size: usize,
    mem_size: usize,
    writable: bool,
) -> Result<()> {
    if mem_size < file_size || vaddr % PAGE_SIZE != offset % PAGE_SIZE {
        return_errno_with_message!(Errno::ENOENT, "malformed load segment");
    }
    if vaddr.checked_add(mem_size).is_none() || vaddr + mem_size > USER_STACK_TOP {
        return_errno_with_message!(Errno::ENOENT, "segment outside user space");
    }

    let page_pad = vaddr % PAGE_SIZE;
    let upage_start = vaddr - page_pad;
    let file_start = offset - page_pad;
    // Leading padding counts as readable bytes so in-page layout holds.
    let total_read = file_size + page_pad;
    let total_mem = mem_size + page_pad;
    let pages = total_mem.div_ceil(PAGE_SIZE);

    let policy = if writable {
        WritebackPolicy::SwapOnDirty
    } else {
        WritebackPolicy::Never
    };
    for i in 0..pages {
        let page_off = i * PAGE_SIZE;
        let read_bytes = total_read.saturating_sub(page_off).min(PAGE_SIZE);
        let origin = FileOrigin {
            file: file.clone(),
            offset: file_start + page_off,
            read_bytes,
            policy,
        };
        process
            .spt()
            .install_file(upage_start + page_off, origin, writable)?;
    }
    Ok(())
}

/// Lays out argc/argv on the fresh stack, C-style: the strings live at
/// the top, a null-terminated pointer array below them, then `argv`,
/// `argc` and a fake return address; all word slots 4-byte aligned.
/// Returns the initial ESP.
fn build_argv_stack(argv: &[String]) -> Result<Vaddr> {
    let mut sp = USER_STACK_TOP;

    let mut string_addrs = Vec::with_capacity(argv.len());
    for arg in argv.iter().rev() {
        sp -= arg.len() + 1;
        util::write_bytes_to_user(sp, arg.as_bytes())?;
        util::write_bytes_to_user(sp + arg.len(), &[0])?;
        string_addrs.push(sp as u32);
    }
    string_addrs.reverse();

    sp &= !3;

    push_word(&mut sp, 0)?; // argv[argc]
    for &addr in string_addrs.iter().rev() {
        push_word(&mut sp, addr)?;
    }
    let argv_base = sp as u32;
    push_word(&mut sp, argv_base)?;
    push_word(&mut sp, argv.len() as u32)?;
    push_word(&mut sp, 0)?; // fake return address
    Ok(sp)
}

fn push_word(sp: &mut Vaddr, val: u32) -> Result<()> {
    *sp -= 4;
    util::write_u32_to_user(*sp, val)
}
