//! Kernel heap.
//!
//! The boot page directory (`memory::paging::init`) identity-maps the
//! first 256 MiB at `KERNEL_BASE`, which already covers the kernel's own
//! image, so the heap needs no dedicated page-mapping step the way a
//! higher-half loader would: it is simply a statically-sized arena handed
//! to `linked_list_allocator`, the same crate the other examples in this
//! pack (`RedHatOnTop-kernel-performed-illegal-operation`,
//! `veighnsche-LevitateOS`) reach for instead of a hand-rolled bump
//! allocator. A bump allocator never frees, which would leak on every
//! `do_exit`/`do_wait` reap and violate Testable Property 5 (heap bytes
//! return to their pre-fork baseline).

use linked_list_allocator::LockedHeap;

const HEAP_SIZE: usize = 1024 * 1024;

#[repr(align(16))]
struct HeapArena([u8; HEAP_SIZE]);

static mut ARENA: HeapArena = HeapArena([0u8; HEAP_SIZE]);

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Must run once, before any `alloc`-backed value (task table `Vec`s,
/// kernel-stack `Box<[u8]>`s) is touched.
pub fn init() {
    unsafe {
        ALLOCATOR
            .lock()
            .init(core::ptr::addr_of_mut!(ARENA) as *mut u8, HEAP_SIZE);
    }
}

#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("kernel heap exhausted: {:?}", layout)
}
