//! Callee-saved register context for cooperative switching, 32-bit cdecl.

use core::arch::naked_asm;

/// Registers preserved across a `switch_to` call per the cdecl ABI: the
/// caller already has eax/ecx/edx free to clobber, so only these survive.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Context {
    pub esp: u32,
    pub ebp: u32,
    pub ebx: u32,
    pub esi: u32,
    pub edi: u32,
    pub eip: u32,
}

impl Context {
    pub fn empty() -> Self {
        Context { esp: 0, ebp: 0, ebx: 0, esi: 0, edi: 0, eip: 0 }
    }

    /// Build a context that, the first time it's switched to, starts
    /// executing `entry` on a fresh `stack_top`. Used only for tasks that
    /// never return through a trap frame (the idle loop's own context) —
    /// every task that should land in user mode or a kernel thread body
    /// uses [`Context::for_trapframe`] instead.
    pub fn new(entry: u32, stack_top: u32) -> Self {
        let aligned_sp = stack_top & !0xF;
        Context { esp: aligned_sp, ebp: 0, ebx: 0, esi: 0, edi: 0, eip: entry }
    }

    /// Build a context that, the first time it's switched to, runs
    /// [`forkret`] to pop the [`crate::arch::usermode::TrapFrame`] already
    /// sitting at `tf_addr` on the task's own kernel stack and `iret`s into
    /// it. This is how both a forked process and a freshly spawned kernel
    /// thread first start running — the dispatcher never jumps to their
    /// entry point directly, matching the spec's "`forkrets` pops a
    /// hand-forged trap frame" contract (§6).
    ///
    /// Unlike [`Context::new`], `esp` is set to `tf_addr` exactly rather
    /// than rounded down: `forkret` hands it straight to `forkrets` as a
    /// `push`ed argument, and any rounding would desync it from the trap
    /// frame actually written there by `copy_thread`.
    pub fn for_trapframe(tf_addr: u32) -> Self {
        Context { esp: tf_addr, ebp: 0, ebx: 0, esi: tf_addr, edi: 0, eip: forkret as u32 }
    }
}

/// Entered by `switch_to`/`restore` the first time a task forged with
/// [`Context::for_trapframe`] is resumed. `esi` already holds the trap
/// frame's address (restored by the caller right before jumping here);
/// hand it to [`crate::arch::usermode::forkrets`] as its one cdecl argument.
#[unsafe(naked)]
pub unsafe extern "C" fn forkret() {
    naked_asm!(
        "push esi",
        "call {forkrets}",
        forkrets = sym crate::arch::usermode::forkrets,
    );
}

/// Switch from `old` to `new`. Saves the current callee-saved registers
/// into `*old`, then restores them from `*new` and resumes at `new.eip`.
///
/// # Safety
/// Both pointers must reference live [`Context`] values with stack
/// pointers belonging to tasks that are not concurrently running elsewhere.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_to(old: *mut Context, new: *const Context) {
    naked_asm!(
        "mov eax, [esp + 4]", // old
        "mov ecx, [esp + 8]", // new

        "mov [eax + 0x00], esp",
        "mov [eax + 0x04], ebp",
        "mov [eax + 0x08], ebx",
        "mov [eax + 0x0C], esi",
        "mov [eax + 0x10], edi",
        "lea edx, [2f]",
        "mov [eax + 0x14], edx",

        "mov esp, [ecx + 0x00]",
        "mov ebp, [ecx + 0x04]",
        "mov ebx, [ecx + 0x08]",
        "mov esi, [ecx + 0x0C]",
        "mov edi, [ecx + 0x10]",
        "jmp dword ptr [ecx + 0x14]",

        "2:",
        "ret",
    );
}

/// Restore `new` without saving anywhere — used the very first time a
/// task is dispatched, and after `do_exit` abandons the current context.
///
/// # Safety
/// `new` must reference a live [`Context`].
#[unsafe(naked)]
pub unsafe extern "C" fn restore(new: *const Context) {
    naked_asm!(
        "mov eax, [esp + 4]",
        "mov esp, [eax + 0x00]",
        "mov ebp, [eax + 0x04]",
        "mov ebx, [eax + 0x08]",
        "mov esi, [eax + 0x0C]",
        "mov edi, [eax + 0x10]",
        "jmp dword ptr [eax + 0x14]",
    );
}
