//! 256-entry IDT. The bootstrap core populates exactly two gates (timer at
//! vector 32, keyboard at vector 33); every other vector, and every vector on
//! an application processor, is left absent on purpose — a stray interrupt
//! anywhere else is meant to triple-fault the core. See `SPEC_FULL.md` §9,
//! "Empty-IDT on APs": do not "helpfully" install stubs here.
//!
//! Gates point at the hand-written FXSAVE-preserving entry stubs in
//! `stubs.rs` via `set_handler_addr`, the same pattern the teacher's
//! `pic.rs` uses for its own spurious-IRQ gates, rather than the
//! `extern "x86-interrupt"` ABI: the stubs need full control over the stack
//! layout to save the FPU/SSE state by hand.

use x86_64::structures::idt::InterruptDescriptorTable;
use x86_64::VirtAddr;

use crate::config::{KEYBOARD_VECTOR, TIMER_VECTOR};

/// Installs the populated IDT on the bootstrap core.
pub fn install_bootstrap() {
    let mut idt = InterruptDescriptorTable::new();

    // Safety: `stubs::timer_entry`/`keyboard_entry` are naked functions
    // ending in `iretq` that conform to the raw hardware interrupt-gate
    // calling convention; `set_handler_addr` does not impose the
    // `x86-interrupt` Rust ABI on them.
    unsafe {
        idt[TIMER_VECTOR as usize].set_handler_addr(VirtAddr::new(crate::arch::stubs::timer_entry as u64));
        idt[KEYBOARD_VECTOR as usize]
            .set_handler_addr(VirtAddr::new(crate::arch::stubs::keyboard_entry as u64));
    }

    // Leaked deliberately: the IDTR must keep pointing at this table for the
    // remaining lifetime of the bootstrap core.
    let idt: &'static InterruptDescriptorTable = alloc::boxed::Box::leak(alloc::boxed::Box::new(idt));
    idt.load();

    log::debug!("idt: installed bootstrap gates at vectors {TIMER_VECTOR}, {KEYBOARD_VECTOR}");
}

/// Installs a completely empty IDT on an application processor. Any
/// interrupt an AP takes has no gate to dispatch to and triple-faults the
/// core, which is the intended fail-fast behavior — APs have no role in
/// servicing interrupts in this design.
pub fn install_application_processor() {
    let idt = InterruptDescriptorTable::new();
    let idt: &'static InterruptDescriptorTable = alloc::boxed::Box::leak(alloc::boxed::Box::new(idt));
    idt.load();
}
