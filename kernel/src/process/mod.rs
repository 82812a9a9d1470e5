//! Processes.
//!
//! A process is one address space (page directory plus supplemental
//! page table), a descriptor table, a working directory, the running
//! executable held write-denied, and the threads inside it. The global
//! table maps pid to process; a child's exit status lives in a record
//! shared with its parent so `wait` works whether the child is alive,
//! dead, or already gone from the table.

mod exec;
mod fd_table;
mod fork;
mod user_sync;

use core::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

use osprey_frame::cpu::UserContext;
use osprey_frame::task::{Task, TaskOptions, Tid};
use osprey_frame::user::{self, UserEvent};
use osprey_frame::vm::PageDirectory;
use osprey_jfs::{FileHandle, Inode};

use crate::prelude::*;
use crate::thread::{ctx_of, ThreadCtx};
use crate::vm::mmap::MmapTable;
use crate::vm::spt::Spt;
use crate::vm::{mmap, USER_STACK_MAX, USER_STACK_TOP};

pub use fd_table::{FdEntry, FdTable, STDIN_FD, STDOUT_FD};
pub use fork::fork;
pub use user_sync::UserSyncTable;

pub type Pid = u32;

static PID_ALLOCATOR: core::sync::atomic::AtomicU32 = core::sync::atomic::AtomicU32::new(1);

/// Exit code reported for processes the kernel kills.
pub const KILLED_EXIT_CODE: i32 = -1;

/// Thread stacks for `pt_create` are carved below the main stack
/// region, this big each (first page eager, the rest on fault).
const THREAD_STACK_SIZE: usize = 256 * 1024;

/// A child's status, shared between parent and child.
pub struct ChildRecord {
    pub pid: Pid,
    exit_code: AtomicI32,
    exited: Semaphore,
    waited: AtomicBool,
    load_ok: AtomicBool,
    load_done: Semaphore,
}

impl ChildRecord {
    fn new(pid: Pid) -> Arc<Self> {
        Arc::new(ChildRecord {
            pid,
            exit_code: AtomicI32::new(KILLED_EXIT_CODE),
            exited: Semaphore::new(0),
            waited: AtomicBool::new(false),
            load_ok: AtomicBool::new(false),
            load_done: Semaphore::new(0),
        })
    }
}

/// The process control block.
pub struct Process {
    pid: Pid,
    name: String,
    page_dir: Arc<PageDirectory>,
    spt: Spt,
    mmaps: Mutex<MmapTable>,
    fds: Mutex<FdTable>,
    cwd: Mutex<Arc<Inode>>,
    executable: Mutex<Option<Arc<FileHandle>>>,
    children: Mutex<BTreeMap<Pid, Arc<ChildRecord>>>,
    record: Arc<ChildRecord>,
    threads: Mutex<Vec<Arc<Task>>>,
    next_thread_stack: AtomicUsize,
    user_sync: UserSyncTable,
    exiting: AtomicBool,
}

lazy_static! {
    static ref PROCESS_TABLE: Mutex<BTreeMap<Pid, Arc<Process>>> = Mutex::new(BTreeMap::new());
}

/// Gets a process with pid.
pub fn process_by_pid(pid: Pid) -> Option<Arc<Process>> {
    PROCESS_TABLE.lock().get(&pid).cloned()
}

/// The process of the calling thread, `None` on pure kernel threads.
pub fn current() -> Option<Arc<Process>> {
    let task = osprey_frame::task::current_task()?;
    ctx_of(&task)?.process.upgrade()
}

/// Hooks the context switch so every thread runs on its own process's
/// page directory; pure kernel threads keep whatever is loaded (the
/// kernel is mapped everywhere).
pub fn init() {
    osprey_frame::task::set_switch_hook(switch_address_space);
}

fn switch_address_space(task: &Arc<Task>) {
    let Some(thread_ctx) = ctx_of(task) else {
        return;
    };
    let Some(process) = thread_ctx.process.upgrade() else {
        return;
    };
    if !process.page_dir().is_active() {
        process.page_dir().activate();
    }
}

impl Process {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page_dir(&self) -> &Arc<PageDirectory> {
        &self.page_dir
    }

    pub fn spt(&self) -> &Spt {
        &self.spt
    }

    pub fn mmaps(&self) -> &Mutex<MmapTable> {
        &self.mmaps
    }

    pub fn fds(&self) -> &Mutex<FdTable> {
        &self.fds
    }

    pub fn cwd(&self) -> Arc<Inode> {
        self.cwd.lock().clone()
    }

    pub fn set_cwd(&self, inode: Arc<Inode>) {
        *self.cwd.lock() = inode;
    }

    pub fn user_sync(&self) -> &UserSyncTable {
        &self.user_sync
    }

    pub fn record(&self) -> &Arc<ChildRecord> {
        &self.record
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Relaxed)
    }

    fn new(name: String, cwd: Arc<Inode>) -> Result<Arc<Process>> {
        let pid = PID_ALLOCATOR.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(Process {
            pid,
            name,
            page_dir: Arc::new(PageDirectory::new()?),
            spt: Spt::new(),
            mmaps: Mutex::new(MmapTable::new()),
            fds: Mutex::new(FdTable::new()),
            cwd: Mutex::new(cwd),
            executable: Mutex::new(None),
            children: Mutex::new(BTreeMap::new()),
            record: ChildRecord::new(pid),
            threads: Mutex::new(Vec::new()),
            next_thread_stack: AtomicUsize::new(USER_STACK_TOP - USER_STACK_MAX),
            user_sync: UserSyncTable::new(),
            exiting: AtomicBool::new(false),
        }))
    }

    /// Registers the running executable, denying writes to it for the
    /// process's lifetime.
    pub(crate) fn set_executable(&self, file: Arc<FileHandle>) {
        file.inode().deny_write();
        *self.executable.lock() = Some(file);
    }

    pub(crate) fn add_thread(&self, task: Arc<Task>) {
        self.threads.lock().push(task);
    }

    /// Carves the stack region for a new user thread, returning its
    /// top. The first page is installed eagerly; deeper pages are
    /// zero-filled entries that fault in.
    pub(crate) fn alloc_thread_stack(self: &Arc<Self>) -> Result<Vaddr> {
        let top = self
            .next_thread_stack
            .fetch_sub(THREAD_STACK_SIZE, Ordering::Relaxed);
        let base = top - THREAD_STACK_SIZE;
        let mut page = base;
        while page < top {
            self.spt.install_zero(page, true)?;
            page += PAGE_SIZE;
        }
        self.spt.load(self, top - PAGE_SIZE)?;
        Ok(top)
    }
}

impl Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Spawns a process from a command line (`program arg...`). Blocks
/// until the child reports whether its image loaded; a failed load is
/// an error here, not a half-born process.
pub fn spawn_from_cmdline(line: &str, parent: Option<&Arc<Process>>) -> Result<Arc<Process>> {
    let argv: Vec<String> = line.split_whitespace().map(|s| s.to_string()).collect();
    if argv.is_empty() {
        return_errno_with_message!(Errno::EINVAL, "empty command line");
    }
    let name = argv[0].clone();
    let cwd = match parent {
        Some(parent) => parent.cwd(),
        None => crate::fs::jfs().root(),
    };

    let process = Process::new(name.clone(), cwd)?;
    PROCESS_TABLE.lock().insert(process.pid, process.clone());
    if let Some(parent) = parent {
        parent
            .children
            .lock()
            .insert(process.pid, process.record.clone());
    }

    let entry_process = process.clone();
    let task = TaskOptions::new(move || {
        let process = entry_process;
        process.page_dir().activate();
        let mut ctx = UserContext::default();
        let loaded = exec::load_program(&process, &argv, &mut ctx);
        let ok = loaded.is_ok();
        process.record.load_ok.store(ok, Ordering::Relaxed);
        process.record.load_done.up();
        if !ok {
            debug!("load of '{}' failed: {:?}", process.name(), loaded);
            exit_process(&process, KILLED_EXIT_CODE);
        }
        user_loop(&process, &mut ctx);
    })
    .name(name)
    .data(ThreadCtx::new(Arc::downgrade(&process)))
    .spawn();
    let task = match task {
        Ok(task) => task,
        Err(err) => {
            PROCESS_TABLE.lock().remove(&process.pid);
            return Err(err.into());
        }
    };
    process.add_thread(task);

    process.record.load_done.down();
    if !process.record.load_ok.load(Ordering::Relaxed) {
        PROCESS_TABLE.lock().remove(&process.pid);
        return_errno_with_message!(Errno::ENOENT, "program did not load");
    }
    Ok(process)
}

/// Drives one thread of `process` in user mode forever.
pub(crate) fn user_loop(process: &Arc<Process>, ctx: &mut UserContext) -> ! {
    loop {
        match user::execute(ctx) {
            UserEvent::Syscall => {
                crate::syscall::handle_syscall(process, ctx);
            }
            UserEvent::Exception => {
                let resolved = ctx.trap_num == 14
                    && crate::vm::handle_fault(
                        process,
                        ctx.fault_addr as usize,
                        ctx.error_code & 2 != 0,
                        ctx.esp as usize,
                    );
                if !resolved {
                    debug!(
                        "{}: fatal exception {} at {:#x} (addr {:#x})",
                        process.name(),
                        ctx.trap_num,
                        ctx.eip,
                        ctx.fault_addr
                    );
                    exit_process(process, KILLED_EXIT_CODE);
                }
            }
        }
    }
}

/// Terminates the process from its own thread: prints the exit line
/// the harness parses, tears the resources down, signals the parent,
/// and exits the calling thread.
pub fn exit_process(process: &Arc<Process>, code: i32) -> ! {
    osprey_frame::println!("{}: exit({})", process.name(), code);
    process.exiting.store(true, Ordering::Relaxed);

    // Mapped files first: their write-back wants the fd layer alive.
    mmap::munmap_all(process);
    process.fds.lock().clear();
    if let Some(executable) = process.executable.lock().take() {
        executable.inode().allow_write();
    }

    // Step off the address space, then drop it page by page.
    osprey_frame::vm::activate_boot_directory();
    process.spt.destroy_all(process);

    process.record.exit_code.store(code, Ordering::Relaxed);
    process.record.exited.up();
    PROCESS_TABLE.lock().remove(&process.pid);

    exit_thread();
}

/// Exits the calling thread, signalling any joiner.
pub fn exit_thread() -> ! {
    if let Some(task) = crate::thread::current_ctx() {
        if let Some(ctx) = ctx_of(&task) {
            ctx.exit_sema.up();
        }
    }
    osprey_frame::task::exit_current();
}

/// Blocks until `process` exits and returns its code. Used by the boot
/// actions; user parents go through `wait_pid`.
pub fn wait_for(process: &Arc<Process>) -> i32 {
    process.record.exited.down();
    process.record.exit_code.load(Ordering::Relaxed)
}

/// `wait(pid)`: only for one's own children, only once per child.
pub fn wait_pid(parent: &Arc<Process>, pid: Pid) -> Result<i32> {
    let record = parent
        .children
        .lock()
        .get(&pid)
        .cloned()
        .ok_or(Error::with_message(Errno::ECHILD, "not a child"))?;
    if record.waited.swap(true, Ordering::Relaxed) {
        return_errno_with_message!(Errno::ECHILD, "child already waited for");
    }
    record.exited.down();
    let code = record.exit_code.load(Ordering::Relaxed);
    parent.children.lock().remove(&pid);
    Ok(code)
}

/// Creates a user thread in `process` starting at `entry` with `arg`
/// pushed the way a C caller would. Returns the new thread's id.
pub fn create_user_thread(process: &Arc<Process>, entry: Vaddr, arg: u32) -> Result<Tid> {
    let stack_top = process.alloc_thread_stack()?;

    // [fake return address, arg]: the callee sees a normal frame.
    let esp = stack_top - 8;
    crate::util::write_u32_to_user(esp, 0)?;
    crate::util::write_u32_to_user(esp + 4, arg)?;

    let thread_process = process.clone();
    let task = TaskOptions::new(move || {
        let process = thread_process;
        let mut ctx = UserContext {
            eip: entry as u32,
            esp: esp as u32,
            ..Default::default()
        };
        user_loop(&process, &mut ctx);
    })
    .name(format!("{}-pt", process.name()))
    .data(ThreadCtx::new(Arc::downgrade(process)))
    .spawn()?;
    let tid = task.tid();
    process.add_thread(task);
    Ok(tid)
}

/// `pt_join`: waits for a thread of the caller's process.
pub fn join_thread(process: &Arc<Process>, tid: Tid) -> Result<()> {
    let task = {
        let threads = process.threads.lock();
        threads
            .iter()
            .find(|task| task.tid() == tid)
            .cloned()
            .ok_or(Error::new(Errno::ESRCH))?
    };
    let ctx = ctx_of(&task).ok_or(Error::new(Errno::ESRCH))?;
    if ctx.joined.swap(true, Ordering::Relaxed) {
        return_errno_with_message!(Errno::EINVAL, "thread already joined");
    }
    ctx.exit_sema.down();
    Ok(())
}
