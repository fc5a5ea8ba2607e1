//! Exercises scenario S5 from `spec.md` §8: task A sleeps in `wait` for a
//! still-running child B; task C kills A; A wakes, observes `EXITING`, and
//! exits with `-E_KILLED` instead of returning from `wait`.
#![no_std]
#![no_main]

use atomiclibc::{exit, fork, getpid, kill, wait, yield_now};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    let my_pid = getpid();

    let b = fork();
    if b == 0 {
        // B: never exits on its own, so A's wait(b) stays blocked.
        loop {
            yield_now();
        }
    }

    let c = fork();
    if c == 0 {
        // C: a copy of A's address space taken after my_pid was computed,
        // so it still knows which task to kill.
        kill(my_pid);
        exit(0);
    }

    // A blocks here until C's kill wakes it through do_exit(-E_KILLED);
    // this call never returns in that case.
    let status = wait(b);
    exit(status)
}
