//! The task table: a fixed arena of task descriptors plus a hashed index
//! from pid to arena slot, and the pid allocator that keeps pids from
//! being reissued while an old holder might still be remembered (e.g. by
//! a parent that hasn't called `wait` yet).

use super::config::{MAX_PID, MAX_PROCESS, PID_HASH_BUCKETS, PID_HASH_SHIFT};
use super::descriptor::{TaskDescriptor, TaskId};
use crate::error::{KernelError, KernelResult};
use alloc::vec::Vec;

/// Knuth's multiplicative hash constant, same family as the teacher's use
/// of `bit_field` elsewhere for bit-level packing rather than division.
const HASH_MULTIPLIER: u32 = 0x9E37_79B1;

fn hash_pid(pid: i32) -> usize {
    ((pid as u32).wrapping_mul(HASH_MULTIPLIER) >> (32 - PID_HASH_SHIFT)) as usize
}

pub struct TaskTable {
    slots: Vec<Option<TaskDescriptor>>,
    free_slots: Vec<usize>,
    pid_hash: Vec<Vec<usize>>,
    nr_process: usize,
    last_pid: i32,
    next_safe: i32,
}

impl TaskTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_PROCESS);
        slots.resize_with(MAX_PROCESS, || None);
        let free_slots: Vec<usize> = (0..MAX_PROCESS).rev().collect();
        let mut pid_hash = Vec::with_capacity(PID_HASH_BUCKETS);
        pid_hash.resize_with(PID_HASH_BUCKETS, Vec::new);

        TaskTable {
            slots,
            free_slots,
            pid_hash,
            nr_process: 0,
            last_pid: MAX_PID,
            next_safe: MAX_PID,
        }
    }

    pub fn nr_process(&self) -> usize {
        self.nr_process
    }

    /// Allocate the next pid that is neither in use nor likely to collide
    /// with one a parent is still holding onto. Ported from the classic
    /// two-cursor (`last_pid`/`next_safe`) scan: `next_safe` tracks the
    /// smallest in-use pid greater than `last_pid` seen so far, so we know
    /// how far we can advance `last_pid` without rescanning.
    fn alloc_pid(&mut self) -> i32 {
        debug_assert!(MAX_PID as usize > MAX_PROCESS);

        self.last_pid += 1;
        if self.last_pid >= MAX_PID {
            self.last_pid = 1;
            self.rescan();
        } else if self.last_pid >= self.next_safe {
            self.rescan();
        }
        self.last_pid
    }

    fn rescan(&mut self) {
        loop {
            self.next_safe = MAX_PID;
            let mut collided = false;
            for slot in self.slots.iter().flatten() {
                let p = slot.id.0;
                if p == self.last_pid {
                    self.last_pid += 1;
                    if self.last_pid >= self.next_safe {
                        if self.last_pid >= MAX_PID {
                            self.last_pid = 1;
                        }
                        collided = true;
                        break;
                    }
                } else if p > self.last_pid && self.next_safe > p {
                    self.next_safe = p;
                }
            }
            if !collided {
                break;
            }
        }
    }

    fn insert_at_pid<F>(&mut self, pid: i32, build: F) -> KernelResult<TaskId>
    where
        F: FnOnce(TaskId) -> TaskDescriptor,
    {
        let slot_index = *self.free_slots.last().ok_or(KernelError::NoFreeProc)?;
        self.free_slots.pop();

        let id = TaskId(pid);
        let descriptor = build(id);
        debug_assert_eq!(descriptor.id, id);

        self.slots[slot_index] = Some(descriptor);
        self.pid_hash[hash_pid(id.0)].push(slot_index);
        self.nr_process += 1;
        Ok(id)
    }

    /// Reserve a slot and a freshly-allocated pid for a new task, run
    /// `build` to produce its descriptor, and link it into the table.
    pub fn insert_with<F>(&mut self, build: F) -> KernelResult<TaskId>
    where
        F: FnOnce(TaskId) -> TaskDescriptor,
    {
        if self.free_slots.is_empty() {
            return Err(KernelError::NoFreeProc);
        }
        let pid = self.alloc_pid();
        self.insert_at_pid(pid, build)
    }

    /// Reserve the distinguished idle (pid 0) or init (pid 1) slot.
    /// Bootstrap-only: ordinary tasks always go through [`Self::insert_with`].
    pub fn insert_reserved<F>(&mut self, pid: i32, build: F) -> KernelResult<TaskId>
    where
        F: FnOnce(TaskId) -> TaskDescriptor,
    {
        debug_assert!(pid == TaskId::IDLE.0 || pid == TaskId::INIT.0);
        self.insert_at_pid(pid, build)
    }

    fn find_slot(&self, id: TaskId) -> Option<usize> {
        self.pid_hash[hash_pid(id.0)]
            .iter()
            .copied()
            .find(|&slot| matches!(&self.slots[slot], Some(t) if t.id == id))
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskDescriptor> {
        self.find_slot(id).and_then(|slot| self.slots[slot].as_ref())
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskDescriptor> {
        let slot = self.find_slot(id)?;
        self.slots[slot].as_mut()
    }

    /// Unlink a task permanently — called once its parent has reaped its
    /// zombie exit status via `wait`.
    pub fn remove(&mut self, id: TaskId) -> Option<TaskDescriptor> {
        let slot = self.find_slot(id)?;
        let bucket = &mut self.pid_hash[hash_pid(id.0)];
        bucket.retain(|&s| s != slot);
        let descriptor = self.slots[slot].take();
        self.free_slots.push(slot);
        self.nr_process -= 1;
        descriptor
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TaskDescriptor> {
        self.slots.iter_mut().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::context::Context;
    use crate::task::descriptor::{ProcName, TaskFlags, TaskState, WaitState};
    use alloc::boxed::Box;
    use alloc::vec;

    fn stub_descriptor(id: TaskId, parent: Option<TaskId>) -> TaskDescriptor {
        TaskDescriptor {
            id,
            parent,
            children: vec![],
            name: ProcName::new("stub"),
            state: TaskState::Runnable,
            flags: TaskFlags::empty(),
            wait_state: WaitState::empty(),
            need_resched: false,
            runs: 0,
            exit_code: 0,
            context: Context::empty(),
            mm: None,
            cr3: 0,
            kstack: Box::new([]),
            kstack_top: 0,
            tf_addr: 0,
            scheduler_priority: 0,
        }
    }

    #[test]
    fn first_allocations_are_distinct_and_in_range() {
        let mut table = TaskTable::new();
        let mut seen = Vec::new();
        for _ in 0..16 {
            let id = table.insert_with(|id| stub_descriptor(id, None)).unwrap();
            assert!(!seen.contains(&id));
            assert!(id.0 > 0 && id.0 < MAX_PID);
            seen.push(id);
        }
        assert_eq!(table.nr_process(), 16);
    }

    #[test]
    fn removed_pid_is_not_immediately_reissued_while_peers_remain() {
        let mut table = TaskTable::new();
        let mut ids = Vec::new();
        for _ in 0..8 {
            ids.push(table.insert_with(|id| stub_descriptor(id, None)).unwrap());
        }
        let victim = ids[3];
        table.remove(victim);
        assert!(table.get(victim).is_none());

        for _ in 0..8 {
            let id = table.insert_with(|id| stub_descriptor(id, None)).unwrap();
            assert!(table.get(id).is_some());
            assert_ne!(id, victim);
        }
    }

    #[test]
    fn get_and_remove_round_trip() {
        let mut table = TaskTable::new();
        let id = table.insert_with(|id| stub_descriptor(id, None)).unwrap();
        assert!(table.get(id).is_some());
        let removed = table.remove(id).unwrap();
        assert_eq!(removed.id, id);
        assert!(table.get(id).is_none());
        assert_eq!(table.nr_process(), 0);
    }

    #[test]
    fn idle_and_init_take_their_reserved_pids() {
        let mut table = TaskTable::new();
        let idle = table.insert_reserved(TaskId::IDLE.0, |id| stub_descriptor(id, None)).unwrap();
        let init = table
            .insert_reserved(TaskId::INIT.0, |id| stub_descriptor(id, Some(idle)))
            .unwrap();
        assert_eq!(idle, TaskId::IDLE);
        assert_eq!(init, TaskId::INIT);

        let next = table.insert_with(|id| stub_descriptor(id, Some(init))).unwrap();
        assert_ne!(next, TaskId::IDLE);
        assert_ne!(next, TaskId::INIT);
    }

    #[test]
    fn table_reports_full_when_exhausted() {
        let mut table = TaskTable::new();
        for _ in 0..MAX_PROCESS {
            table.insert_with(|id| stub_descriptor(id, None)).unwrap();
        }
        let err = table.insert_with(|id| stub_descriptor(id, None));
        assert_eq!(err.unwrap_err(), KernelError::NoFreeProc);
    }
}
