//! Kernel error taxonomy shared by the task manager and its syscall layer.

use core::fmt;

/// Errors produced by the task/process manager.
///
/// Mirrors the `E_*` codes of `spec.md` §7. The numeric `code()` values are
/// the negative integers the original syscall ABI returns; userland sees
/// `-(code)` in `eax`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Task table is full (`nr_process == MAX_PROCESS`).
    NoFreeProc,
    /// An allocation failed somewhere in the fork/exec path.
    NoMem,
    /// Argument validation failed (bad pointer, bad length, bad pid).
    Inval,
    /// Malformed ELF header or program header.
    InvalElf,
    /// `wait` found no matching child at all.
    BadProc,
    /// Target already exiting, or exit code of a task killed while blocked.
    Killed,
}

impl KernelError {
    /// The negated value placed in the syscall return register.
    pub const fn code(self) -> i32 {
        match self {
            KernelError::NoFreeProc => -1,
            KernelError::NoMem => -2,
            KernelError::Inval => -3,
            KernelError::InvalElf => -4,
            KernelError::BadProc => -5,
            KernelError::Killed => -6,
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::NoFreeProc => "no free process slot",
            KernelError::NoMem => "out of memory",
            KernelError::Inval => "invalid argument",
            KernelError::InvalElf => "invalid ELF image",
            KernelError::BadProc => "no such child process",
            KernelError::Killed => "process already exiting",
        };
        write!(f, "{msg}")
    }
}

pub type KernelResult<T> = Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_negative_values() {
        let all = [
            KernelError::NoFreeProc,
            KernelError::NoMem,
            KernelError::Inval,
            KernelError::InvalElf,
            KernelError::BadProc,
            KernelError::Killed,
        ];
        for e in all {
            assert!(e.code() < 0);
        }
        for i in 0..all.len() {
            for j in 0..all.len() {
                if i != j {
                    assert_ne!(all[i].code(), all[j].code());
                }
            }
        }
    }
}
