//! The terminal state machine: `do_yield`, `do_exit`, `do_wait`/reap,
//! `do_kill`, and `do_execve` (spec §4.7–§4.10, §4.6).

use super::descriptor::{TaskFlags, TaskId, TaskState, WaitState};
use super::manager::{self, TaskManager, TASKS};
use crate::arch::usermode::TrapFrame;
use crate::error::{KernelError, KernelResult};

/// `do_yield`: hint that this task should give up the CPU, then actually
/// do so at this, its own, next safe point.
pub fn do_yield() {
    let mut tasks = TASKS.lock();
    if let Some(t) = tasks.table.get_mut(tasks.current) {
        t.need_resched = true;
    }
    drop(tasks);
    manager::schedule();
}

/// `do_exit`: tear down the current task's address space, turn it into a
/// zombie, wake whoever might be waiting on it, reparent its children to
/// init, and hand the CPU to someone else. Never returns — resuming a
/// zombie's context is a bug somewhere else in the scheduler.
pub fn do_exit(exit_code: i32) -> ! {
    let mut tasks = TASKS.lock();
    let current = tasks.current;
    assert!(current != TaskId::IDLE && current != TaskId::INIT, "idle/init must never exit");

    if let Some(task) = tasks.table.get_mut(current) {
        // Switch off this address space before it can be torn down — the
        // CPU must not keep running on a page directory whose frame is
        // about to go back to the free list.
        crate::memory::paging::load_cr3(crate::memory::paging::boot_cr3());
        // Dropping the Arc here is `mm_count_dec`; on the last reference
        // the AddrSpace itself drops, releasing its page directory frame.
        task.mm = None;
        task.cr3 = crate::memory::paging::boot_cr3();
        task.state = TaskState::Zombie;
        task.exit_code = exit_code;
    }

    let parent_id = tasks.table.get(current).and_then(|t| t.parent);
    if let Some(parent_id) = parent_id {
        let parent_waiting = tasks
            .table
            .get(parent_id)
            .map(|p| p.state == TaskState::Sleeping && p.wait_state.contains(WaitState::CHILD))
            .unwrap_or(false);
        if parent_waiting {
            tasks.wake(parent_id);
        }
    }

    let children = tasks
        .table
        .get_mut(current)
        .map(|t| core::mem::take(&mut t.children))
        .unwrap_or_default();
    for child in children {
        if let Some(c) = tasks.table.get_mut(child) {
            c.parent = Some(TaskId::INIT);
        }
        if let Some(init) = tasks.table.get_mut(TaskId::INIT) {
            init.children.push(child);
        }
        let child_is_zombie = tasks.table.get(child).map(|c| c.is_zombie()).unwrap_or(false);
        if child_is_zombie {
            let init_waiting = tasks
                .table
                .get(TaskId::INIT)
                .map(|i| i.state == TaskState::Sleeping && i.wait_state.contains(WaitState::CHILD))
                .unwrap_or(false);
            if init_waiting {
                tasks.wake(TaskId::INIT);
            }
        }
    }

    drop(tasks);
    manager::schedule();
    panic!("do_exit: schedule returned into a zombie task");
}

/// Unlink a reaped zombie from its parent's child list and the task table,
/// returning its exit code. The descriptor's `Drop` (kernel stack, any
/// remaining `mm` reference) runs as part of `TaskTable::remove`.
fn reap(tasks: &mut TaskManager, parent_id: TaskId, zombie_id: TaskId) -> i32 {
    if let Some(p) = tasks.table.get_mut(parent_id) {
        p.children.retain(|&c| c != zombie_id);
    }
    let descriptor = tasks.table.remove(zombie_id).expect("zombie vanished during reap");
    descriptor.exit_code
}

/// `do_wait`: reap an already-exited child if one exists, otherwise block
/// until one does. `pid == 0` means "any child". Loops after being woken
/// by a kill, per the spec's "observe `EXITING`, call `do_exit`" handling.
pub fn do_wait(pid: i32, mut exit_code_out: Option<&mut i32>) -> KernelResult<()> {
    loop {
        let mut tasks = TASKS.lock();
        let current = tasks.current;

        let (zombie, has_matching_child) = if pid != 0 {
            let target = TaskId(pid);
            let is_child = tasks.table.get(current).map(|t| t.children.contains(&target)).unwrap_or(false);
            if !is_child {
                return Err(KernelError::BadProc);
            }
            let is_zombie = tasks.table.get(target).map(|t| t.is_zombie()).unwrap_or(false);
            (is_zombie.then_some(target), true)
        } else {
            let children = tasks.table.get(current).map(|t| t.children.clone()).unwrap_or_default();
            let zombie = children.iter().copied().find(|&c| tasks.table.get(c).map(|t| t.is_zombie()).unwrap_or(false));
            (zombie, !children.is_empty())
        };

        if let Some(zombie) = zombie {
            let code = reap(&mut tasks, current, zombie);
            drop(tasks);
            if let Some(out) = exit_code_out.as_deref_mut() {
                *out = code;
            }
            return Ok(());
        }

        if !has_matching_child {
            return Err(KernelError::BadProc);
        }

        if let Some(t) = tasks.table.get_mut(current) {
            t.state = TaskState::Sleeping;
            t.wait_state = WaitState::CHILD | WaitState::INTERRUPTED;
        }
        drop(tasks);
        manager::schedule();

        let killed = {
            let tasks = TASKS.lock();
            tasks.table.get(current).map(|t| t.flags.contains(TaskFlags::EXITING)).unwrap_or(false)
        };
        if killed {
            do_exit(KernelError::Killed.code());
        }
    }
}

/// `do_kill`: raise `EXITING` on the target and wake it if it is in an
/// interruptible sleep. Never transitions the target itself — it is the
/// target's own control flow that must observe the flag and call
/// `do_exit`.
pub fn do_kill(pid: i32) -> KernelResult<()> {
    let mut tasks = TASKS.lock();
    let target = TaskId(pid);
    let task = tasks.table.get_mut(target).ok_or(KernelError::Inval)?;
    if task.flags.contains(TaskFlags::EXITING) {
        return Err(KernelError::Killed);
    }
    task.flags.insert(TaskFlags::EXITING);
    let should_wake = task.state == TaskState::Sleeping && task.wait_state.contains(WaitState::INTERRUPTED);
    if should_wake {
        tasks.wake(target);
    }
    Ok(())
}

/// `do_execve`: release the caller's current address space (if any), load
/// a new one from `binary`, rewrite the trap frame at `tf_addr` in place,
/// and dive straight into the trap-return path at that frame — there is no
/// "return to caller" on either branch: success lands directly in user
/// mode via [`crate::arch::usermode::forkrets`], failure calls `do_exit`.
/// `tf_addr` is the address of this task's own trap frame on its kernel
/// stack (`TaskDescriptor::tf_addr`), matching spec §4.6's assumption that
/// the caller already has a kernel stack and a current trap frame.
pub fn do_execve(name: &str, binary: &[u8], tf_addr: u32) -> ! {
    if name.len() > super::config::PROC_NAME_LEN {
        do_exit(KernelError::Inval.code());
    }

    let mut tasks = TASKS.lock();
    let current = tasks.current;
    if let Some(task) = tasks.table.get_mut(current) {
        // Same ordering as `do_exit`: off the old page directory before
        // its frame can be freed and handed to someone else.
        crate::memory::paging::load_cr3(crate::memory::paging::boot_cr3());
        task.mm = None;
        task.cr3 = crate::memory::paging::boot_cr3();
    }
    drop(tasks);

    match crate::loader::elf::load_icode(binary) {
        Ok((mm, entry)) => {
            let cr3 = mm.lock().cr3();
            crate::memory::paging::load_cr3(cr3);

            let mut tasks = TASKS.lock();
            if let Some(task) = tasks.table.get_mut(current) {
                task.mm = Some(mm);
                task.cr3 = cr3;
                task.name = super::descriptor::ProcName::new(name);
            }
            drop(tasks);

            let tf = unsafe { &mut *(tf_addr as *mut TrapFrame) };
            tf.cs = crate::arch::gdt::USER_CODE_SELECTOR as u32;
            tf.ss = crate::arch::gdt::USER_DATA_SELECTOR as u32;
            tf.esp = crate::memory::paging::USTACKTOP;
            tf.eip = entry;
            tf.eflags = 0x202;

            crate::arch::usermode::forkrets(tf_addr as *const TrapFrame)
        }
        Err(err) => do_exit(err.code()),
    }
}
