//! 32-bit protected-mode architecture support: GDT/TSS, IDT, port I/O.

pub mod gdt;
pub mod idt;
pub mod io;
pub mod usermode;

pub fn init() {
    gdt::init();
    idt::init();
}
