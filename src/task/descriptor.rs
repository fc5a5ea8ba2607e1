//! The task descriptor: identity, scheduling state, and address-space
//! handle for one task.
//!
//! Decomposed per the family-tree design choice recorded in `DESIGN.md`:
//! parent/child links are [`TaskId`]s resolved through the task table
//! rather than raw pointers, so the descriptor owns no cyclic references.

use super::config::PROC_NAME_LEN;
use super::context::Context;
use crate::memory::mm::AddrSpace;
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use bitflags::bitflags;
use spin::Mutex;

/// Task identifier. Pid 0 is the idle task, pid 1 is init, otherwise a
/// unique positive value `<= MAX_PID`. `-1` marks an allocated-but-not-yet-
/// initialized descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub i32);

impl TaskId {
    pub const UNINIT: TaskId = TaskId(-1);
    pub const IDLE: TaskId = TaskId(0);
    pub const INIT: TaskId = TaskId(1);
}

/// Lifecycle states a task moves through. `Runnable` covers both "ready"
/// and "currently dispatched" — which of the runnable tasks is actually
/// executing is tracked separately by [`super::manager::TaskManager::current`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Uninit,
    Runnable,
    Sleeping,
    Zombie,
}

bitflags! {
    /// Per-task flags. The only defined bit mirrors the one the spec
    /// names: `kill` sets it, the target observes it at its own next
    /// safe point and voluntarily exits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TaskFlags: u32 {
        const EXITING = 1 << 0;
    }
}

bitflags! {
    /// What a `Sleeping` task is waiting on.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct WaitState: u32 {
        /// Blocked in `do_wait`, woken when any child changes state.
        const CHILD       = 1 << 0;
        /// This sleep may be broken early by `kill` observing `EXITING`.
        const INTERRUPTED = 1 << 1;
    }
}

/// Fixed-width process name storage — truncated, not reallocated, on a
/// name longer than [`PROC_NAME_LEN`]. Purely diagnostic.
#[derive(Clone, Copy)]
pub struct ProcName {
    bytes: [u8; PROC_NAME_LEN],
    len: usize,
}

impl ProcName {
    pub fn new(name: &str) -> Self {
        let mut bytes = [0u8; PROC_NAME_LEN];
        let src = name.as_bytes();
        let len = src.len().min(PROC_NAME_LEN);
        bytes[..len].copy_from_slice(&src[..len]);
        ProcName { bytes, len }
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or("?")
    }
}

impl core::fmt::Debug for ProcName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

/// One task.
pub struct TaskDescriptor {
    pub id: TaskId,
    /// `None` only for idle; every other task has a living parent until
    /// reaped, and orphans are reparented to init rather than left dangling.
    pub parent: Option<TaskId>,
    pub children: Vec<TaskId>,
    pub name: ProcName,
    pub state: TaskState,
    pub flags: TaskFlags,
    pub wait_state: WaitState,
    pub need_resched: bool,
    pub runs: u64,
    pub exit_code: i32,
    pub context: Context,
    /// Shared address space, or `None` for a kernel-only thread.
    pub mm: Option<Arc<Mutex<AddrSpace>>>,
    /// Physical address of the page directory currently active for this
    /// task: `mm`'s directory, or the boot directory for mm-less tasks.
    pub cr3: u32,
    /// Owned kernel stack; `kstack_top` is the address immediately above it.
    pub kstack: Box<[u8]>,
    pub kstack_top: u32,
    /// Address, within `kstack`, of this task's trap frame. Valid while the
    /// task is entering or returning from a trap; used by `do_execve` to
    /// rewrite the frame it will return through.
    pub tf_addr: u32,
    /// Opaque to this core; carried so a real scheduler policy has
    /// somewhere to hang priority/stride state without widening the
    /// descriptor's public contract.
    pub scheduler_priority: u32,
}

impl TaskDescriptor {
    pub fn is_zombie(&self) -> bool {
        self.state == TaskState::Zombie
    }
}
