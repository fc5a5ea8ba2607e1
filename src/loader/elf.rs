//! ELF32 image loader (`load_icode`) — turns a static binary into a fresh
//! address space with mapped, populated segments and a user stack, ready
//! for a trap-return into user mode.

use crate::error::{KernelError, KernelResult};
use crate::memory::frame_allocator::PAGE_SIZE;
use crate::memory::mm::{AddrSpace, SharedAddrSpace, VmFlags};
use crate::memory::paging::USTACKTOP;
use crate::task::config::USTACK_SIZE;
use alloc::sync::Arc;
use spin::Mutex;

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS32: u8 = 1;
const PT_LOAD: u32 = 1;
const PF_X: u32 = 1 << 0;
const PF_W: u32 = 1 << 1;

struct Elf32Ehdr {
    e_entry: u32,
    e_phoff: u32,
    e_phentsize: u16,
    e_phnum: u16,
}

impl Elf32Ehdr {
    fn parse(data: &[u8]) -> KernelResult<Self> {
        if data.len() < 52 || data[0..4] != ELF_MAGIC || data[4] != ELFCLASS32 {
            return Err(KernelError::InvalElf);
        }
        Ok(Elf32Ehdr {
            e_entry: u32::from_le_bytes(data[24..28].try_into().unwrap()),
            e_phoff: u32::from_le_bytes(data[28..32].try_into().unwrap()),
            e_phentsize: u16::from_le_bytes(data[42..44].try_into().unwrap()),
            e_phnum: u16::from_le_bytes(data[44..46].try_into().unwrap()),
        })
    }
}

struct Elf32Phdr {
    p_type: u32,
    p_offset: u32,
    p_vaddr: u32,
    p_filesz: u32,
    p_memsz: u32,
    p_flags: u32,
}

impl Elf32Phdr {
    fn parse(data: &[u8]) -> KernelResult<Self> {
        if data.len() < 32 {
            return Err(KernelError::InvalElf);
        }
        Ok(Elf32Phdr {
            p_type: u32::from_le_bytes(data[0..4].try_into().unwrap()),
            p_offset: u32::from_le_bytes(data[4..8].try_into().unwrap()),
            p_vaddr: u32::from_le_bytes(data[8..12].try_into().unwrap()),
            p_filesz: u32::from_le_bytes(data[16..20].try_into().unwrap()),
            p_memsz: u32::from_le_bytes(data[20..24].try_into().unwrap()),
            p_flags: u32::from_le_bytes(data[24..28].try_into().unwrap()),
        })
    }
}

/// Parse `binary`, build a brand-new address space with every `PT_LOAD`
/// segment mapped and populated and a user stack reserved below
/// [`USTACKTOP`], and return it along with the entry point. Leaves the
/// caller (`do_execve`) to bind the mm to the current task and rewrite its
/// trap frame — this function never touches the current task.
pub fn load_icode(binary: &[u8]) -> KernelResult<(SharedAddrSpace, u32)> {
    let mut space = AddrSpace::create().ok_or(KernelError::NoMem)?;
    let ehdr = Elf32Ehdr::parse(binary)?;

    for i in 0..ehdr.e_phnum {
        let off = ehdr.e_phoff as usize + i as usize * ehdr.e_phentsize as usize;
        let bytes = binary.get(off..).ok_or(KernelError::InvalElf)?;
        let phdr = Elf32Phdr::parse(bytes)?;
        if phdr.p_type != PT_LOAD {
            continue;
        }
        if phdr.p_filesz > phdr.p_memsz {
            return Err(KernelError::InvalElf);
        }
        if phdr.p_filesz == 0 {
            continue;
        }

        let mut flags = VmFlags::READ;
        if phdr.p_flags & PF_W != 0 {
            flags |= VmFlags::WRITE;
        }
        if phdr.p_flags & PF_X != 0 {
            flags |= VmFlags::EXEC;
        }
        space.mm_map(phdr.p_vaddr, phdr.p_memsz, flags);

        let seg_end = phdr.p_vaddr + phdr.p_memsz;
        let mut va = phdr.p_vaddr & !(PAGE_SIZE - 1);
        while va < seg_end {
            let kva = space.alloc_page_at(va).ok_or(KernelError::NoMem)?;
            unsafe { core::ptr::write_bytes(kva as *mut u8, 0, PAGE_SIZE as usize) };

            let file_start = core::cmp::max(va, phdr.p_vaddr);
            let file_end = core::cmp::min(va + PAGE_SIZE, phdr.p_vaddr + phdr.p_filesz);
            if file_end > file_start {
                let src_off = (phdr.p_offset + (file_start - phdr.p_vaddr)) as usize;
                let len = (file_end - file_start) as usize;
                let src = binary.get(src_off..src_off + len).ok_or(KernelError::InvalElf)?;
                let dst = (kva + (file_start - va)) as *mut u8;
                unsafe { core::ptr::copy_nonoverlapping(src.as_ptr(), dst, len) };
            }
            va += PAGE_SIZE;
        }
    }

    let ustack_bottom = USTACKTOP - USTACK_SIZE as u32;
    space.mm_map(ustack_bottom, USTACK_SIZE as u32, VmFlags::READ | VmFlags::WRITE | VmFlags::STACK);
    let mut va = ustack_bottom;
    while va < USTACKTOP {
        space.alloc_page_at(va).ok_or(KernelError::NoMem)?;
        va += PAGE_SIZE;
    }

    Ok((Arc::new(Mutex::new(space)), ehdr.e_entry))
}
