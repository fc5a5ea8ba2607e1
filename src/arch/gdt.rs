//! Flat-model Global Descriptor Table and Task State Segment.
//!
//! The 32-bit protected-mode equivalent of the teacher's `x86_64`-crate GDT:
//! one descriptor table shared by ring 0 and ring 3, plus a TSS that exists
//! only to carry `esp0`/`ss0` so the CPU knows which kernel stack to load
//! on a ring 3 → ring 0 transition (syscall, interrupt, fault).

use core::mem::size_of;
use lazy_static::lazy_static;
use spin::Mutex;

/// Selector indices, in GDT entry order. Entry 0 is the mandatory null
/// descriptor.
const SEG_NULL: usize = 0;
const SEG_KERNEL_CODE: usize = 1;
const SEG_KERNEL_DATA: usize = 2;
const SEG_USER_CODE: usize = 3;
const SEG_USER_DATA: usize = 4;
const SEG_TSS: usize = 5;

const GDT_ENTRIES: usize = 6;

pub const KERNEL_CODE_SELECTOR: u16 = (SEG_KERNEL_CODE as u16) << 3;
pub const KERNEL_DATA_SELECTOR: u16 = (SEG_KERNEL_DATA as u16) << 3;
/// RPL=3 baked into the low two bits, per the x86 selector format.
pub const USER_CODE_SELECTOR: u16 = ((SEG_USER_CODE as u16) << 3) | 3;
pub const USER_DATA_SELECTOR: u16 = ((SEG_USER_DATA as u16) << 3) | 3;
pub const TSS_SELECTOR: u16 = (SEG_TSS as u16) << 3;

/// A packed 8-byte GDT descriptor, encoded by hand since there is no
/// 32-bit-capable descriptor builder in the dependency set.
fn encode_descriptor(base: u32, limit: u32, access: u8, flags: u8) -> u64 {
    let mut entry: u64 = 0;
    entry |= (limit & 0xFFFF) as u64;
    entry |= ((base & 0xFFFFFF) as u64) << 16;
    entry |= (access as u64) << 40;
    entry |= (((limit >> 16) & 0xF) as u64) << 48;
    entry |= ((flags & 0xF) as u64) << 52;
    entry |= (((base >> 24) & 0xFF) as u64) << 56;
    entry
}

/// Present, ring-0 code segment, readable/executable.
const ACCESS_KERNEL_CODE: u8 = 0x9A;
const ACCESS_KERNEL_DATA: u8 = 0x92;
/// Ring-3 variants: DPL bits (5:6) set to 11.
const ACCESS_USER_CODE: u8 = 0xFA;
const ACCESS_USER_DATA: u8 = 0xF2;
const ACCESS_TSS: u8 = 0x89;

/// 4 KiB granularity, 32-bit operand size.
const FLAGS_CODE_DATA: u8 = 0xC;
const FLAGS_TSS: u8 = 0x0;

/// Minimal 32-bit TSS: only the fields the CPU actually reads during a
/// ring transition are meaningful here (`ss0`/`esp0`); everything else is
/// zeroed and unused because task switching is done in software.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Tss {
    prev_task_link: u16,
    _reserved0: u16,
    pub esp0: u32,
    pub ss0: u16,
    _reserved1: u16,
    esp1: u32,
    ss1: u16,
    _reserved2: u16,
    esp2: u32,
    ss2: u16,
    _reserved3: u16,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u16,
    _reserved4: u16,
    cs: u16,
    _reserved5: u16,
    ss: u16,
    _reserved6: u16,
    ds: u16,
    _reserved7: u16,
    fs: u16,
    _reserved8: u16,
    gs: u16,
    _reserved9: u16,
    ldt_selector: u16,
    _reserved10: u16,
    _reserved11: u16,
    iomap_base: u16,
}

impl Tss {
    const fn new() -> Self {
        Tss {
            prev_task_link: 0,
            _reserved0: 0,
            esp0: 0,
            ss0: 0,
            _reserved1: 0,
            esp1: 0,
            ss1: 0,
            _reserved2: 0,
            esp2: 0,
            ss2: 0,
            _reserved3: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            _reserved4: 0,
            cs: 0,
            _reserved5: 0,
            ss: 0,
            _reserved6: 0,
            ds: 0,
            _reserved7: 0,
            fs: 0,
            _reserved8: 0,
            gs: 0,
            _reserved9: 0,
            ldt_selector: 0,
            _reserved10: 0,
            _reserved11: 0,
            iomap_base: size_of::<Tss>() as u16,
        }
    }
}

pub static TSS: Mutex<Tss> = Mutex::new(Tss::new());

lazy_static! {
    static ref GDT: Mutex<[u64; GDT_ENTRIES]> = Mutex::new([0u64; GDT_ENTRIES]);
}

/// Descriptor pointer format consumed by the `lgdt` instruction.
#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

pub fn init() {
    let tss_addr = {
        let tss = TSS.lock();
        &*tss as *const Tss as u32
    };

    let mut gdt = GDT.lock();
    gdt[SEG_NULL] = 0;
    gdt[SEG_KERNEL_CODE] = encode_descriptor(0, 0xFFFFF, ACCESS_KERNEL_CODE, FLAGS_CODE_DATA);
    gdt[SEG_KERNEL_DATA] = encode_descriptor(0, 0xFFFFF, ACCESS_KERNEL_DATA, FLAGS_CODE_DATA);
    gdt[SEG_USER_CODE] = encode_descriptor(0, 0xFFFFF, ACCESS_USER_CODE, FLAGS_CODE_DATA);
    gdt[SEG_USER_DATA] = encode_descriptor(0, 0xFFFFF, ACCESS_USER_DATA, FLAGS_CODE_DATA);
    gdt[SEG_TSS] = encode_descriptor(
        tss_addr,
        (size_of::<Tss>() - 1) as u32,
        ACCESS_TSS,
        FLAGS_TSS,
    );

    let ptr = DescriptorTablePointer {
        limit: (GDT_ENTRIES * size_of::<u64>() - 1) as u16,
        base: gdt.as_ptr() as u32,
    };

    unsafe {
        core::arch::asm!(
            "lgdt [{0}]",
            in(reg) &ptr,
            options(readonly, nostack, preserves_flags)
        );
        reload_segments();
        core::arch::asm!("ltr {0:x}", in(reg) TSS_SELECTOR, options(nostack, preserves_flags));
    }
}

/// Reload CS/DS/SS/ES/FS/GS with the freshly-loaded descriptors. CS requires
/// a far jump since it cannot be loaded with a plain `mov`.
unsafe fn reload_segments() {
    core::arch::asm!(
        "push {code_sel}",
        "lea {tmp}, [2f]",
        "push {tmp}",
        "retf",
        "2:",
        "mov ax, {data_sel:x}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "mov ss, ax",
        code_sel = in(reg) KERNEL_CODE_SELECTOR as u32,
        data_sel = in(reg) KERNEL_DATA_SELECTOR,
        tmp = lateout(reg) _,
        out("ax") _,
    );
}

/// Point the TSS at the current task's kernel stack so a ring 3 → ring 0
/// transition lands on the right stack. Called by the dispatcher on every
/// context switch, mirroring the teacher's `set_tss_rsp0`.
pub fn set_kernel_stack(esp0: u32) {
    let mut tss = TSS.lock();
    tss.esp0 = esp0;
    tss.ss0 = KERNEL_DATA_SELECTOR;
}
