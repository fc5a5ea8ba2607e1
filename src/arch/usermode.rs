//! `int 0x80` syscall gate and ring 3 transition, 32-bit flavor.
//!
//! The trap frame shape here is also what `task::fork::copy_thread` forges
//! for a freshly-forked child: pushing one of these by hand and `iret`-ing
//! into it is how a new task "returns from a syscall it never made".

use core::arch::naked_asm;

/// Registers as the CPU + our prologue leave them on entry to a syscall.
/// Field order matches the push sequence in `syscall_entry`, reversed —
/// lowest address (top of stack) first.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapFrame {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    // Pushed by the CPU on the `int 0x80` gate (ring 3 -> ring 0):
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u32,
}

impl TrapFrame {
    /// Build the frame `iret` needs to land a brand-new task directly in
    /// ring 3 at `entry`, as if it had just taken the syscall trap.
    pub fn for_new_user_task(entry: u32, user_stack_top: u32) -> Self {
        TrapFrame {
            eax: 0,
            eip: entry,
            cs: super::gdt::USER_CODE_SELECTOR as u32,
            eflags: 0x202, // IF=1, reserved bit 1 always set
            esp: user_stack_top,
            ss: super::gdt::USER_DATA_SELECTOR as u32,
            ..Default::default()
        }
    }

    /// Build the frame `forkrets` needs to land a new kernel thread in
    /// [`kernel_thread_entry`], with `entry`/`arg` smuggled through
    /// `esi`/`edi` (popped into those live registers right before the
    /// `iretd`, per [`kernel_thread_entry`]'s doc comment).
    pub fn for_kernel_thread(entry: u32, arg: u32, kernel_stack_top: u32) -> Self {
        TrapFrame {
            esi: entry,
            edi: arg,
            eip: kernel_thread_entry as u32,
            cs: super::gdt::KERNEL_CODE_SELECTOR as u32,
            eflags: 0x202,
            esp: kernel_stack_top,
            ss: super::gdt::KERNEL_DATA_SELECTOR as u32,
            ..Default::default()
        }
    }
}

/// Entered via the IDT's `int 0x80` gate. Convention: EAX=syscall number,
/// EBX=arg0, ECX=arg1, EDX=arg2. Result is returned in EAX.
///
/// `dispatch` additionally receives the trap frame's own address, so
/// `do_fork` can read the trap frame the syscall actually arrived through
/// (the "pointer to the caller's trap frame" spec §4.4 requires), rather
/// than a value the Rust layer has no way to reconstruct on its own.
#[unsafe(naked)]
pub extern "C" fn syscall_entry() {
    naked_asm!(
        "push ebp",
        "push edi",
        "push esi",
        "push edx",
        "push ecx",
        "push ebx",
        "push eax",
        // esp now points at the freshly-pushed TrapFrame; ebp is safely
        // saved in memory, so it is free to reuse as a scratch pointer to
        // it for the rest of the prologue.
        "mov ebp, esp",

        // cdecl: push dispatch(tf, number, arg0, arg1, arg2) right-to-left.
        "push dword ptr [ebp + 12]", // edx (arg2)
        "push dword ptr [ebp + 8]",  // ecx (arg1)
        "push dword ptr [ebp + 4]",  // ebx (arg0)
        "push dword ptr [ebp + 0]",  // eax (syscall number)
        "push ebp",                  // tf
        "call {dispatch}",
        "add esp, 20",

        // Return value is already in eax; discard the stale saved copy.
        "add esp, 4",

        // Syscalls are only ever taken from ring 3, so the return path
        // always reloads the user data selector. ecx is safe as scratch:
        // its real saved value is still on the stack and gets popped next.
        "mov cx, {user_ds}",
        "mov ds, cx",
        "mov es, cx",
        "mov fs, cx",
        "mov gs, cx",

        "pop ebx",
        "pop ecx",
        "pop edx",
        "pop esi",
        "pop edi",
        "pop ebp",
        "iretd",
        dispatch = sym crate::syscalls::dispatch,
        user_ds = const super::gdt::USER_DATA_SELECTOR,
    );
}

/// Entered from [`crate::task::context::switch_to`] the first time a freshly
/// forked or spawned task is resumed: pops a [`TrapFrame`] it never pushed
/// itself and `iret`s into it, exactly as `forkrets` does in the original
/// trap/assembly contract (spec §6). Reloads the data segment selectors for
/// whichever ring the frame targets, since a forked *kernel* thread's frame
/// has `cs`/`ss` set to the kernel selectors while a forked *user* task's has
/// the ring-3 ones.
#[unsafe(naked)]
pub extern "C" fn forkrets(_tf: *const TrapFrame) -> ! {
    naked_asm!(
        "mov ebp, [esp + 4]",

        // TrapFrame::cs lives at byte offset 28 (eax,ebx,ecx,edx,esi,edi,ebp
        // are 7 u32 fields, then eip, then cs).
        "mov eax, [ebp + 28]",
        "and eax, 3",
        "mov edx, {kernel_ds}",
        "cmp eax, 0",
        "je 2f",
        "mov edx, {user_ds}",
        "2:",
        "mov ds, dx",
        "mov es, dx",
        "mov fs, dx",
        "mov gs, dx",

        "mov esp, ebp",
        "pop eax",
        "pop ebx",
        "pop ecx",
        "pop edx",
        "pop esi",
        "pop edi",
        "pop ebp",
        "iretd",
        kernel_ds = const super::gdt::KERNEL_DATA_SELECTOR,
        user_ds = const super::gdt::USER_DATA_SELECTOR,
    );
}

/// Trampoline a freshly-spawned kernel thread into its Rust entry point.
///
/// [`TrapFrame::for_kernel_thread`] smuggles the function pointer and
/// argument through the frame's `esi`/`edi` fields; `forkrets` pops them
/// into the live registers, and this naked shim hands them to
/// [`kernel_thread_trampoline`] using the plain cdecl calling convention.
#[unsafe(naked)]
pub extern "C" fn kernel_thread_entry() -> ! {
    naked_asm!(
        "push edi",
        "push esi",
        "call {trampoline}",
        trampoline = sym kernel_thread_trampoline,
    );
}

extern "C" fn kernel_thread_trampoline(entry: u32, arg: u32) -> ! {
    let entry: fn(u32) -> i32 = unsafe { core::mem::transmute(entry) };
    let exit_code = entry(arg);
    crate::task::exit::do_exit(exit_code);
}

/// Transfer control to ring 3 by constructing and `iret`-ing into a
/// [`TrapFrame`]. Used once, for the very first user task — every
/// subsequent entry to ring 3 happens through the dispatcher's normal
/// task-switch-then-`iret` path.
pub fn jump_to_usermode(entry: u32, user_stack_top: u32) -> ! {
    let user_cs = super::gdt::USER_CODE_SELECTOR as u32;
    let user_ds = super::gdt::USER_DATA_SELECTOR as u32;
    unsafe {
        core::arch::asm!(
            "cli",
            "mov ax, {user_ds:x}",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",
            "push {user_ds}",
            "push {stack}",
            "pushfd",
            "pop eax",
            "or eax, 0x200",
            "push eax",
            "push {user_cs}",
            "push {entry}",
            "iretd",
            user_ds = in(reg) user_ds,
            user_cs = in(reg) user_cs,
            stack = in(reg) user_stack_top,
            entry = in(reg) entry,
            out("eax") _,
            options(noreturn),
        );
    }
}
