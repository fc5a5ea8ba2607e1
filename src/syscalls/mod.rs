//! The syscall surface: the `int 0x80` table from spec §6, translating raw
//! register arguments into task-manager calls and `KernelResult` into the
//! raw negative-error-code ABI.

use crate::arch::usermode::TrapFrame;
use crate::error::KernelError;
use crate::task::exit::{do_execve, do_exit, do_kill, do_wait, do_yield};
use crate::task::fork::{do_fork, CloneFlags};
use crate::task::manager::TASKS;

pub const SYS_EXIT: u32 = 0;
pub const SYS_FORK: u32 = 1;
pub const SYS_WAIT: u32 = 2;
pub const SYS_EXEC: u32 = 3;
pub const SYS_YIELD: u32 = 4;
pub const SYS_KILL: u32 = 5;
pub const SYS_GETPID: u32 = 6;

/// Layout `SYS_EXEC`'s third argument points at: the binary is passed out
/// of band from the three general-purpose argument registers, since spec
/// §6's `name, len, binary, size` needs four words and only three are
/// available (ebx/ecx/edx).
#[repr(C)]
struct ExecImage {
    binary_ptr: u32,
    binary_len: u32,
}

/// Central syscall dispatcher, called from [`crate::arch::usermode::syscall_entry`].
/// `tf` is the trap frame the syscall actually arrived through — the same
/// pointer `do_fork` forges a child around. Convention: eax = syscall
/// number, ebx/ecx/edx = arg0/arg1/arg2; result returns in eax, a negative
/// [`KernelError::code`] on failure.
pub extern "C" fn dispatch(tf: *mut TrapFrame, number: u32, arg0: u32, arg1: u32, arg2: u32) -> u32 {
    match number {
        SYS_EXIT => do_exit(arg0 as i32),

        SYS_FORK => match do_fork(CloneFlags::empty(), 0, unsafe { &*tf }) {
            Ok(pid) => pid as u32,
            Err(e) => e.code() as u32,
        },

        SYS_WAIT => {
            let pid = arg0 as i32;
            let out_ptr = arg1 as *mut i32;
            let mut exit_code = 0;
            match do_wait(pid, Some(&mut exit_code)) {
                Ok(()) => {
                    if !out_ptr.is_null() {
                        unsafe { core::ptr::write(out_ptr, exit_code) };
                    }
                    0
                }
                Err(e) => e.code() as u32,
            }
        }

        SYS_EXEC => {
            let name_ptr = arg0 as *const u8;
            let name_len = arg1 as usize;
            let image_ptr = arg2 as *const ExecImage;
            if name_ptr.is_null() || image_ptr.is_null() || name_len > crate::task::config::PROC_NAME_LEN {
                do_exit(KernelError::Inval.code());
            }

            let name = unsafe {
                core::str::from_utf8(core::slice::from_raw_parts(name_ptr, name_len)).unwrap_or("?")
            };
            let image = unsafe { core::ptr::read(image_ptr) };
            let binary =
                unsafe { core::slice::from_raw_parts(image.binary_ptr as *const u8, image.binary_len as usize) };

            let tf_addr = {
                let tasks = TASKS.lock();
                tasks.table.get(tasks.current).map(|t| t.tf_addr).unwrap_or(tf as u32)
            };
            do_execve(name, binary, tf_addr)
        }

        SYS_YIELD => {
            do_yield();
            0
        }

        SYS_KILL => match do_kill(arg0 as i32) {
            Ok(()) => 0,
            Err(e) => e.code() as u32,
        },

        SYS_GETPID => {
            let tasks = TASKS.lock();
            tasks.current.0 as u32
        }

        _ => KernelError::Inval.code() as u32,
    }
}
