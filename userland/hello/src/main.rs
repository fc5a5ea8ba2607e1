//! Smallest possible userland program: exits with a fixed code so the
//! kernel's init loop (`task::bootstrap::init_main`) has something to reap.
#![no_std]
#![no_main]

#[no_mangle]
pub extern "C" fn _start() -> ! {
    atomiclibc::exit(0)
}
