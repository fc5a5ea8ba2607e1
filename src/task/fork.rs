//! Address-space duplication, kernel-stack allocation, and `do_fork` itself
//! — the fork core (spec §4.2–§4.5).

use super::config::KSTACK_SIZE;
use super::context::Context;
use super::descriptor::{ProcName, TaskDescriptor, TaskFlags, TaskId, TaskState, WaitState};
use super::manager::TASKS;
use crate::arch::usermode::TrapFrame;
use crate::error::{KernelError, KernelResult};
use crate::memory::mm::{AddrSpace, SharedAddrSpace};
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use bitflags::bitflags;
use spin::Mutex;

bitflags! {
    /// Clone behavior for `do_fork`. Only one bit is meaningful to this
    /// core; everything else ucore's `clone_flags` defines (signal handler
    /// sharing, fs sharing) has no counterpart here.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct CloneFlags: u32 {
        /// Share the parent's address space instead of deep-copying it —
        /// what makes a `do_fork` call produce a "thread" rather than a
        /// "process" (spec's GLOSSARY entry for Task/process/thread).
        const SHARE_VM = 1 << 0;
    }
}

fn alloc_kstack() -> Box<[u8]> {
    vec![0u8; KSTACK_SIZE].into_boxed_slice()
}

/// `copy_mm`: either share, deep-copy, or skip address-space duplication
/// depending on `flags` and whether the parent has an `mm` at all.
fn copy_mm(flags: CloneFlags, parent_mm: Option<&SharedAddrSpace>) -> KernelResult<Option<SharedAddrSpace>> {
    let Some(parent_mm) = parent_mm else {
        return Ok(None);
    };
    if flags.contains(CloneFlags::SHARE_VM) {
        return Ok(Some(Arc::clone(parent_mm)));
    }
    let mut child_space = AddrSpace::create().ok_or(KernelError::NoMem)?;
    let parent = parent_mm.lock();
    child_space.dup_from(&parent);
    drop(parent);
    Ok(Some(Arc::new(Mutex::new(child_space))))
}

/// `copy_thread`: forge a trap frame at the top of the new kernel stack so
/// the child, dispatched for the first time, looks like it is returning
/// from the very syscall the parent is currently inside of — with a zero
/// return value and the requested user stack.
fn copy_thread(kstack_top: u32, user_sp: u32, parent_tf: &TrapFrame) -> (Context, u32) {
    let mut tf = *parent_tf;
    tf.eax = 0;
    if user_sp != 0 {
        tf.esp = user_sp;
    }
    tf.eflags |= 0x200;

    let tf_addr = kstack_top - core::mem::size_of::<TrapFrame>() as u32;
    unsafe { core::ptr::write(tf_addr as *mut TrapFrame, tf) };

    (Context::for_trapframe(tf_addr), tf_addr)
}

/// `do_fork`: compose stack allocation, address-space duplication, and
/// trap-frame forging into one atomic task creation. `parent_tf` is the
/// trap frame the caller actually trapped in through — passed down from
/// `syscall_entry`, not re-derived from the descriptor, matching the
/// spec's "a pointer to the caller's trap frame" input (§4.4).
pub fn do_fork(flags: CloneFlags, user_sp: u32, parent_tf: &TrapFrame) -> KernelResult<i32> {
    let mut tasks = TASKS.lock();
    if tasks.table.nr_process() >= super::config::MAX_PROCESS {
        return Err(KernelError::NoFreeProc);
    }

    let parent_id = tasks.current;
    let parent = tasks.table.get(parent_id).expect("current task missing from table");
    debug_assert!(parent.wait_state.is_empty());
    let parent_mm = parent.mm.clone();
    drop(tasks);

    let kstack = alloc_kstack();
    let kstack_top = kstack.as_ptr() as u32 + KSTACK_SIZE as u32;

    let mm = copy_mm(flags, parent_mm.as_ref())?;
    let (context, tf_addr) = copy_thread(kstack_top, user_sp, parent_tf);
    let cr3 = mm.as_ref().map(|m| m.lock().cr3()).unwrap_or_else(crate::memory::paging::boot_cr3);

    let mut tasks = TASKS.lock();
    let child_id = tasks.table.insert_with(|id| TaskDescriptor {
        id,
        parent: Some(parent_id),
        children: Vec::new(),
        name: ProcName::new(""),
        state: TaskState::Uninit,
        flags: TaskFlags::empty(),
        wait_state: WaitState::empty(),
        need_resched: false,
        runs: 0,
        exit_code: 0,
        context,
        mm,
        cr3,
        kstack,
        kstack_top,
        tf_addr,
        scheduler_priority: 0,
    })?;

    if let Some(parent) = tasks.table.get_mut(parent_id) {
        parent.children.push(child_id);
    }
    tasks.wake(child_id);

    Ok(child_id.0)
}

/// `kernel_thread`: spawn a task that shares the kernel address space and
/// starts running `entry(arg)` instead of returning into user mode.
/// Synthesizes its own trap frame (`TrapFrame::for_kernel_thread`) rather
/// than copying the caller's, since a kernel thread has no user-mode
/// program counter to resume — the rest of the creation path is identical
/// to `do_fork`, which this is spec'd as a call into (§4.5).
pub fn kernel_thread(entry: fn(u32) -> i32, arg: u32) -> KernelResult<i32> {
    let mut tasks = TASKS.lock();
    if tasks.table.nr_process() >= super::config::MAX_PROCESS {
        return Err(KernelError::NoFreeProc);
    }
    let parent_id = tasks.current;
    drop(tasks);

    let kstack = alloc_kstack();
    let kstack_top = kstack.as_ptr() as u32 + KSTACK_SIZE as u32;

    let tf = TrapFrame::for_kernel_thread(entry as u32, arg, kstack_top);
    let tf_addr = kstack_top - core::mem::size_of::<TrapFrame>() as u32;
    unsafe { core::ptr::write(tf_addr as *mut TrapFrame, tf) };
    let context = Context::for_trapframe(tf_addr);

    let mut tasks = TASKS.lock();
    let child_id = tasks.table.insert_with(|id| TaskDescriptor {
        id,
        parent: Some(parent_id),
        children: Vec::new(),
        name: ProcName::new(""),
        state: TaskState::Uninit,
        flags: TaskFlags::empty(),
        wait_state: WaitState::empty(),
        need_resched: false,
        runs: 0,
        exit_code: 0,
        context,
        mm: None,
        cr3: crate::memory::paging::boot_cr3(),
        kstack,
        kstack_top,
        tf_addr,
        scheduler_priority: 0,
    })?;

    if let Some(parent) = tasks.table.get_mut(parent_id) {
        parent.children.push(child_id);
    }
    tasks.wake(child_id);

    Ok(child_id.0)
}
