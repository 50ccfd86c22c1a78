//! Hand-written interrupt entry stubs for the two vectors this kernel ever
//! services. `SPEC_FULL.md` §4.4 requires that these preserve every
//! general-purpose register plus the FPU/SSE state across the handler call,
//! with the stack 16-byte aligned at the call site per the SysV ABI — the
//! `x86_64` crate's `extern "x86-interrupt"` ABI does not give that level of
//! control over the save area, so these are raw naked functions instead,
//! wired into the IDT via `set_handler_addr` exactly as the teacher's
//! `pic.rs` does for its own hand-installed spurious-IRQ gates.
//!
//! Register layout on entry to a stub (top of stack downward):
//! hardware interrupt frame (RIP, CS, RFLAGS, RSP, SS; 5 qwords), then the 15
//! general-purpose registers pushed here, then the 512-byte FXSAVE area. If
//! the CPU's automatic 16-byte realignment on interrupt entry holds (true in
//! long mode), pushing 15 GPRs (120 bytes) after the 5-qword frame keeps RSP
//! 16-aligned, and the subsequent 512-byte FXSAVE area (itself a multiple of
//! 16) preserves that alignment across the `call`.

use core::arch::naked_asm;

macro_rules! interrupt_stub {
    ($name:ident, $handler:path) => {
        #[unsafe(naked)]
        pub extern "C" fn $name() {
            naked_asm!(
                "push rax",
                "push rbx",
                "push rcx",
                "push rdx",
                "push rsi",
                "push rdi",
                "push rbp",
                "push r8",
                "push r9",
                "push r10",
                "push r11",
                "push r12",
                "push r13",
                "push r14",
                "push r15",
                "sub rsp, 512",
                "fxsave [rsp]",
                "call {handler}",
                "fxrstor [rsp]",
                "add rsp, 512",
                "pop r15",
                "pop r14",
                "pop r13",
                "pop r12",
                "pop r11",
                "pop r10",
                "pop r9",
                "pop r8",
                "pop rbp",
                "pop rdi",
                "pop rsi",
                "pop rdx",
                "pop rcx",
                "pop rbx",
                "pop rax",
                "iretq",
                handler = sym $handler,
            );
        }
    };
}

interrupt_stub!(timer_entry, crate::arch::apic::handle_timer_interrupt);
interrupt_stub!(keyboard_entry, crate::arch::ps2::handle_keyboard_interrupt);
