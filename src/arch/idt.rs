//! 256-entry Interrupt Descriptor Table for 32-bit protected mode.
//!
//! Replaces the teacher's `x86_64::structures::idt::InterruptDescriptorTable`
//! (a 64-bit-only type) with hand-packed gate descriptors and a single
//! assembly entry stub per vector, in the spirit of the teacher's
//! `lazy_static!`-built table plus `extern "x86-interrupt"` handlers.

use crate::{log_error, log_info};
use lazy_static::lazy_static;
use spin::Mutex;

const IDT_ENTRIES: usize = 256;

pub const VEC_DOUBLE_FAULT: u8 = 8;
pub const VEC_GENERAL_PROTECTION: u8 = 13;
pub const VEC_PAGE_FAULT: u8 = 14;
/// The lone software interrupt this kernel defines: the syscall gate.
pub const VEC_SYSCALL: u8 = 0x80;

const GATE_INTERRUPT_32: u8 = 0x8E;
const GATE_TRAP_32: u8 = 0x8F;
/// DPL=3 so user mode can `int 0x80` without faulting.
const GATE_TRAP_32_USER: u8 = 0xEF;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct GateDescriptor {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl GateDescriptor {
    const fn missing() -> Self {
        GateDescriptor { offset_low: 0, selector: 0, zero: 0, type_attr: 0, offset_high: 0 }
    }

    fn new(handler: u32, type_attr: u8) -> Self {
        GateDescriptor {
            offset_low: (handler & 0xFFFF) as u16,
            selector: super::gdt::KERNEL_CODE_SELECTOR,
            zero: 0,
            type_attr,
            offset_high: (handler >> 16) as u16,
        }
    }
}

lazy_static! {
    static ref IDT: Mutex<[GateDescriptor; IDT_ENTRIES]> =
        Mutex::new([GateDescriptor::missing(); IDT_ENTRIES]);
}

#[repr(C, packed)]
struct DescriptorTablePointer {
    limit: u16,
    base: u32,
}

pub fn init() {
    let mut idt = IDT.lock();
    idt[VEC_DOUBLE_FAULT as usize] = GateDescriptor::new(double_fault_handler as u32, GATE_TRAP_32);
    idt[VEC_GENERAL_PROTECTION as usize] =
        GateDescriptor::new(general_protection_handler as u32, GATE_TRAP_32);
    idt[VEC_PAGE_FAULT as usize] = GateDescriptor::new(page_fault_handler as u32, GATE_TRAP_32);
    idt[VEC_SYSCALL as usize] =
        GateDescriptor::new(super::usermode::syscall_entry as u32, GATE_TRAP_32_USER);

    let ptr = DescriptorTablePointer {
        limit: (IDT_ENTRIES * core::mem::size_of::<GateDescriptor>() - 1) as u16,
        base: idt.as_ptr() as u32,
    };

    unsafe {
        core::arch::asm!("lidt [{0}]", in(reg) &ptr, options(readonly, nostack, preserves_flags));
    }
    log_info!("IDT loaded with {} entries", IDT_ENTRIES);
}

extern "x86-interrupt" fn double_fault_handler() -> ! {
    panic!("double fault");
}

extern "x86-interrupt" fn general_protection_handler(error_code: u32) {
    panic!("general protection fault, error code {:#x}", error_code);
}

extern "x86-interrupt" fn page_fault_handler(error_code: u32) {
    let fault_addr: u32;
    unsafe { core::arch::asm!("mov {0}, cr2", out(reg) fault_addr) };
    log_error!("page fault at {:#x}, error code {:#x}", fault_addr, error_code);
    panic!("page fault");
}
