//! Global task manager: owns the task table and the current-task pointer,
//! and runs the round-robin dispatcher.

use super::context::{self, Context};
use super::descriptor::{TaskId, TaskState};
use super::table::TaskTable;
use lazy_static::lazy_static;
use spin::Mutex;

pub struct TaskManager {
    pub table: TaskTable,
    pub current: TaskId,
    /// Round-robin cursor over live pids, rebuilt lazily each tick since
    /// the table is small enough that a linear scan is cheap.
    run_queue: alloc::collections::VecDeque<TaskId>,
}

impl TaskManager {
    fn new() -> Self {
        TaskManager {
            table: TaskTable::new(),
            current: TaskId::UNINIT,
            run_queue: alloc::collections::VecDeque::new(),
        }
    }

    pub fn wake(&mut self, id: TaskId) {
        if let Some(task) = self.table.get_mut(id) {
            if task.state != TaskState::Zombie {
                task.state = TaskState::Runnable;
                task.wait_state = super::descriptor::WaitState::empty();
            }
        }
        if !self.run_queue.contains(&id) {
            self.run_queue.push_back(id);
        }
    }

    /// Wake every task sleeping on [`WaitState::CHILD`] — used after an
    /// `exit` or state change a parent's `wait` might be blocked on.
    pub fn wake_waiting_parents(&mut self) {
        let ids: alloc::vec::Vec<TaskId> = self
            .table
            .iter()
            .filter(|t| {
                t.state == TaskState::Sleeping
                    && t.wait_state.contains(super::descriptor::WaitState::CHILD)
            })
            .map(|t| t.id)
            .collect();
        for id in ids {
            self.wake(id);
        }
    }

    fn next_runnable(&mut self) -> Option<TaskId> {
        let len = self.run_queue.len();
        for _ in 0..len {
            let id = self.run_queue.pop_front()?;
            match self.table.get(id).map(|t| t.state) {
                Some(TaskState::Runnable) => return Some(id),
                Some(_) => continue,
                None => continue,
            }
        }
        None
    }

    pub fn enqueue(&mut self, id: TaskId) {
        self.run_queue.push_back(id);
    }
}

lazy_static! {
    pub static ref TASKS: Mutex<TaskManager> = Mutex::new(TaskManager::new());
}

/// Pick the next runnable task and switch to it. A no-op if nothing else is
/// runnable — the caller keeps running (this is how the idle task keeps the
/// CPU busy when every other task is blocked).
///
/// The caller is expected to have already updated its own `state` before
/// calling (`Sleeping` to block, `Zombie` to exit); a task that is merely
/// yielding leaves its state as `Runnable`, which is what causes it to be
/// re-enqueued here rather than dropped.
///
/// A free function rather than a `TaskManager` method: the actual register
/// switch in `context::switch_to`/`restore` suspends this call stack and
/// resumes a different one entirely, so the `TASKS` lock must already be
/// released before it happens — holding it across the switch would mean the
/// next task to call `schedule` (or anything else that locks `TASKS`)
/// deadlocks against a guard nothing will ever drop.
pub fn schedule() {
    let mut tasks = TASKS.lock();

    let Some(next) = tasks.next_runnable() else { return };
    if next == tasks.current {
        return;
    }

    let prev = tasks.current;
    if let Some(task) = tasks.table.get(prev) {
        if task.state == TaskState::Runnable {
            tasks.enqueue(prev);
        }
    }
    tasks.current = next;

    let old_ctx: *mut Context = tasks
        .table
        .get_mut(prev)
        .map(|t| &mut t.context as *mut Context)
        .unwrap_or(core::ptr::null_mut());
    let new_ctx: *const Context = tasks
        .table
        .get(next)
        .map(|t| &t.context as *const Context)
        .expect("scheduled task vanished");

    if let Some(task) = tasks.table.get_mut(next) {
        task.runs += 1;
        crate::arch::gdt::set_kernel_stack(task.kstack_top);
        crate::memory::paging::load_cr3(task.cr3);
    }

    // Dropping the guard here, before the unsafe switch, is the entire
    // point of this being a free function instead of `&mut self`.
    drop(tasks);

    if old_ctx.is_null() {
        unsafe { context::restore(new_ctx) };
    } else {
        unsafe { context::switch_to(old_ctx, new_ctx) };
    }
}

