//! Compile-time sizing for the task subsystem.

/// Hard ceiling on live task descriptors. Mirrors the fixed-size process
/// table of small teaching kernels rather than growing unbounded.
pub const MAX_PROCESS: usize = 4096;

/// PIDs are drawn from a wider range than `MAX_PROCESS` so a recycled slot
/// doesn't immediately reissue a PID a wait()ing parent still remembers.
pub const MAX_PID: i32 = MAX_PROCESS as i32 * 2;

/// Bucket count for the PID -> task-table-index hash, a power of two so the
/// multiplicative hash can mask instead of dividing.
pub const PID_HASH_SHIFT: u32 = 10;
pub const PID_HASH_BUCKETS: usize = 1 << PID_HASH_SHIFT;

/// Fixed-width name storage, short_name-style: long names are truncated.
pub const PROC_NAME_LEN: usize = 15;

/// Kernel stack granted to every task, including idle/init.
pub const KSTACK_SIZE: usize = 4096 * 2;

/// Default user stack reserved for a freshly-`exec`ed image.
pub const USTACK_PAGES: usize = 4;
pub const USTACK_SIZE: usize = USTACK_PAGES * 4096;

const _: () = assert!(PID_HASH_BUCKETS.is_power_of_two());
const _: () = assert!(MAX_PID as usize > MAX_PROCESS);
