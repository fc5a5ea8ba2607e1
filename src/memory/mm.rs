//! Address-space descriptor (`mm_struct` equivalent): a page directory plus
//! a list of virtual-memory regions, share-counted among tasks that clone
//! with `SHARE_VM`. Satisfies the memory-manager contract the task manager
//! consumes (`mm_create`, `dup_mmap`, `exit_mmap`, `mm_map`, ...).

use super::paging::PageDirectory;
use super::FRAME_ALLOCATOR;
use alloc::vec::Vec;
use spin::Mutex;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct VmFlags: u32 {
        const READ  = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC  = 1 << 2;
        const STACK = 1 << 3;
    }
}

/// One mapped virtual-address region, e.g. an ELF segment or the user
/// stack.
#[derive(Clone, Copy, Debug)]
pub struct Vma {
    pub start: u32,
    pub end: u32,
    pub flags: VmFlags,
}

impl Vma {
    fn page_perm(self) -> u32 {
        let mut perm = super::paging::PTE_USER;
        if self.flags.contains(VmFlags::WRITE) {
            perm |= super::paging::PTE_WRITABLE;
        }
        perm
    }
}

/// The address-space descriptor itself. Always reached behind
/// `Arc<Mutex<AddrSpace>>` from a [`crate::task::descriptor::TaskDescriptor`];
/// the refcount on the `Arc` *is* the share count the spec calls
/// `mm_count_inc`/`mm_count_dec`, so those are just `Arc::clone`/`drop`.
pub struct AddrSpace {
    pub pgdir: PageDirectory,
    pub vmas: Vec<Vma>,
}

impl AddrSpace {
    /// `mm_create`: a fresh, empty address space with its own page
    /// directory (kernel half pre-populated, per [`PageDirectory::new`]).
    pub fn create() -> Option<AddrSpace> {
        Some(AddrSpace { pgdir: PageDirectory::new()?, vmas: Vec::new() })
    }

    pub fn cr3(&self) -> u32 {
        self.pgdir.cr3()
    }

    /// `mm_map`: reserve `[va, va + size)` for `flags`, returning the new
    /// region. Does not populate any pages — that is `load_icode`'s job,
    /// page by page, matching the spec's "eager allocation, not demand
    /// paging" non-goal.
    pub fn mm_map(&mut self, va: u32, size: u32, flags: VmFlags) -> &Vma {
        let vma = Vma { start: va, end: va + size, flags };
        self.vmas.push(vma);
        self.vmas.last().unwrap()
    }

    /// Allocate and map one page at `va` inside an already-reserved region,
    /// returning its kernel-virtual address so the caller can write into it.
    pub fn alloc_page_at(&mut self, va: u32) -> Option<u32> {
        let perm = self
            .vmas
            .iter()
            .find(|v| va >= v.start && va < v.end)
            .map(|v| v.page_perm())
            .unwrap_or(super::paging::PTE_USER);
        self.pgdir.alloc_page(va, perm)
    }

    /// `dup_mmap`: copy every region and its backing pages from `src` into
    /// `self`, preserving per-page permissions and contents. Used by
    /// `copy_mm` for a process-style (non-`SHARE_VM`) fork.
    pub fn dup_from(&mut self, src: &AddrSpace) {
        for vma in &src.vmas {
            self.mm_map(vma.start, vma.end - vma.start, vma.flags);
            let mut va = vma.start;
            while va < vma.end {
                if let (Some(src_frame), Some(dst_kva)) = (src.pgdir.frame_at(va), self.alloc_page_at(va)) {
                    let src_kva = super::paging::page2kva(src_frame);
                    unsafe {
                        core::ptr::copy_nonoverlapping(
                            src_kva as *const u8,
                            dst_kva as *mut u8,
                            super::frame_allocator::PAGE_SIZE as usize,
                        );
                    }
                }
                va += super::frame_allocator::PAGE_SIZE;
            }
        }
    }

    /// `exit_mmap`: free every data frame mapped by every region, then drop
    /// the regions themselves. The page-table and directory frames backing
    /// those mappings are reclaimed separately, by `PageDirectory`'s `Drop`,
    /// which runs right after this when the owning `AddrSpace` is dropped.
    pub fn exit_mmap(&mut self) {
        for vma in self.vmas.drain(..) {
            let mut va = vma.start;
            while va < vma.end {
                if let Some(frame) = self.pgdir.frame_at(va) {
                    FRAME_ALLOCATOR.lock().free_frame(frame);
                }
                va += super::frame_allocator::PAGE_SIZE;
            }
        }
    }
}

impl Drop for AddrSpace {
    /// Guarantees `exit_mmap` runs even if a caller forgets to call it
    /// explicitly — the moment the last `Arc<Mutex<AddrSpace>>` reference
    /// goes away (a task's `mm` field set to `None`, or the descriptor
    /// itself removed from the table), every frame this address space
    /// owns goes back to [`FRAME_ALLOCATOR`].
    fn drop(&mut self) {
        self.exit_mmap();
    }
}

/// `lock_mm`/`unlock_mm` from the external contract are just the `Mutex`
/// guard's lifetime; callers take `mm.lock()` directly rather than naming
/// a separate function for it.
pub type SharedAddrSpace = alloc::sync::Arc<Mutex<AddrSpace>>;
