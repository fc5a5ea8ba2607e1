//! Physical frame allocator bootstrap, paging, the `mm_struct` equivalent,
//! and the wiring between them used once at boot.

pub mod frame_allocator;
pub mod mm;
pub mod paging;

use frame_allocator::BumpFrameAllocator;
use lazy_static::lazy_static;
use spin::Mutex;

lazy_static! {
    pub static ref FRAME_ALLOCATOR: Mutex<BumpFrameAllocator> = Mutex::new(BumpFrameAllocator::new());
}

/// Physical memory below this is reserved for the kernel image and boot
/// structures (per the boot-sector contract in `spec.md` §6, the kernel is
/// loaded starting at a fixed low physical address); the allocator only
/// ever hands out frames above it. A real boot loader would report the
/// actual kernel size; this kernel picks a conservative fixed boundary
/// instead, documented as a simplification in `DESIGN.md`.
const USABLE_MEMORY_START: u32 = 4 * 1024 * 1024;

/// Matches the 256 MiB the boot page directory identity-maps in
/// [`paging::init`] — frames beyond this would have no kernel-virtual
/// address to be reached through.
const USABLE_MEMORY_END: u32 = 256 * 1024 * 1024;

pub fn init() {
    unsafe { FRAME_ALLOCATOR.lock().init(USABLE_MEMORY_START, USABLE_MEMORY_END) };
    crate::log_info!(
        "physical frame allocator initialized over [{:#x}, {:#x})",
        USABLE_MEMORY_START,
        USABLE_MEMORY_END
    );

    paging::init();

    #[cfg(not(test))]
    {
        crate::allocator::init();
        crate::log_info!("kernel heap initialized");
    }
}
