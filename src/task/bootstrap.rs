//! `proc_init`: create idle (pid 0) and init (pid 1), then hand control to
//! the scheduler. Bootstrap shape ported from `original_source/`'s
//! `init_main`/`user_main` split (SPEC_FULL.md §4): init forks a kernel
//! thread that execs the baked-in binary, then waits out all children.

use super::config::KSTACK_SIZE;
use super::context::Context;
use super::descriptor::{ProcName, TaskDescriptor, TaskFlags, TaskId, TaskState, WaitState};
use super::manager::TASKS;
use alloc::boxed::Box;
use alloc::vec::Vec;

/// Binary baked into the kernel image for the very first user task. Set
/// once by [`init`]; read by [`user_main`].
static mut INIT_BINARY: &'static [u8] = &[];

/// Idle's kernel stack is the boot stack the bootloader handed us, not a
/// freshly `Box`-allocated one — there is no earlier task to free it from.
static mut IDLE_KSTACK: [u8; KSTACK_SIZE] = [0u8; KSTACK_SIZE];

/// Create idle and init and prime the scheduler's `current` pointer.
/// `init_binary` is the static ELF image `user_main` will `do_execve`.
pub fn init(init_binary: &'static [u8]) {
    unsafe {
        let addr = core::ptr::addr_of_mut!(INIT_BINARY);
        *addr = init_binary;
    }

    let kstack_top = unsafe { core::ptr::addr_of!(IDLE_KSTACK) as u32 + KSTACK_SIZE as u32 };

    let mut tasks = TASKS.lock();
    let idle = tasks
        .table
        .insert_reserved(TaskId::IDLE.0, |id| TaskDescriptor {
            id,
            parent: None,
            children: Vec::new(),
            name: ProcName::new("idle"),
            state: TaskState::Runnable,
            flags: TaskFlags::empty(),
            wait_state: WaitState::empty(),
            need_resched: true,
            runs: 0,
            exit_code: 0,
            context: Context::empty(),
            mm: None,
            cr3: crate::memory::paging::boot_cr3(),
            kstack: Box::new([]),
            kstack_top,
            tf_addr: 0,
            scheduler_priority: 0,
        })
        .expect("failed to create idle task");
    tasks.current = idle;
    drop(tasks);

    let init_pid = super::fork::kernel_thread(init_main, 0).expect("failed to create init task");
    debug_assert_eq!(init_pid, TaskId::INIT.0, "init must be pid 1");

    let mut tasks = TASKS.lock();
    if let Some(init) = tasks.table.get_mut(TaskId::INIT) {
        init.name = ProcName::new("init");
    }
    crate::log_info!("proc_init: idle (pid 0) and init (pid 1) created");
}

/// init's kernel-thread body: spawn `user_main`, then reap children until
/// none are left, checking Testable Property 5's free-resource invariant.
fn init_main(_arg: u32) -> i32 {
    let free_before = crate::memory::FRAME_ALLOCATOR.lock().free_count();

    super::fork::kernel_thread(user_main, 0).expect("failed to spawn user_main");

    loop {
        let mut exit_code = 0;
        match super::exit::do_wait(0, Some(&mut exit_code)) {
            Ok(()) => {
                crate::log_info!("init: reaped a child, exit_code={}", exit_code);
            }
            Err(crate::error::KernelError::BadProc) => break,
            Err(e) => panic!("init: unexpected do_wait error {:?}", e),
        }
    }

    let free_after = crate::memory::FRAME_ALLOCATOR.lock().free_count();
    debug_assert_eq!(free_before, free_after, "physical frames leaked across fork/exit/wait");

    let tasks = TASKS.lock();
    debug_assert_eq!(tasks.table.nr_process(), 2, "only idle and init should remain");
    drop(tasks);

    crate::log_info!("init: all children reaped, nr_process == 2");
    0
}

/// The very first user-mode task: exec the baked-in binary. Runs as a
/// kernel thread until `do_execve` rewrites its trap frame to land in
/// user mode — from its own point of view it never returns from this call.
fn user_main(_arg: u32) -> i32 {
    let binary = unsafe { core::ptr::addr_of!(INIT_BINARY).read() };

    let mut tasks = TASKS.lock();
    let current = tasks.current;
    let tf_addr = tasks.table.get(current).map(|t| t.tf_addr).unwrap_or(0);
    drop(tasks);

    super::exit::do_execve("user_main", binary, tf_addr);
}

/// The idle body: spin, yielding whenever `need_resched` is set. Runs on
/// the boot stack forever — it is what executes when nothing else is
/// runnable, and it never itself becomes a zombie (spec invariant 7).
pub fn idle_loop() -> ! {
    loop {
        let need_resched = {
            let mut tasks = TASKS.lock();
            let current = tasks.current;
            tasks.table.get_mut(current).map(|t| core::mem::take(&mut t.need_resched)).unwrap_or(false)
        };
        if need_resched {
            super::manager::schedule();
        } else {
            crate::arch::io::hlt();
        }
    }
}

/// Bootstrap the whole task subsystem and fall into the idle loop. The
/// entry point `_start` calls this once, after memory and arch init.
pub fn start(init_binary: &'static [u8]) -> ! {
    init(init_binary);
    crate::arch::io::enable_interrupts();
    idle_loop()
}
