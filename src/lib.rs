//! Kestrel is a minimal x86_64 kernel that boots directly from UEFI firmware,
//! brings every logical processor in the system into 64-bit mode, and runs a
//! fixed set of cooperating jobs across them. There is no user mode, no
//! preemption outside the bootstrap core, and no recovery from a fault: every
//! unexpected condition is fatal by design.
//!
//! The phases below run strictly in order; each one's postconditions are the
//! next one's preconditions. See `SPEC_FULL.md` at the workspace root for the
//! full design.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "kernel-stack", allow(dead_code))]

extern crate alloc;

// Unit tests for the pure-logic modules (ACPI/MADT parsing, the job queue's
// slot protocol, paging flag arithmetic, bump-allocator arithmetic, the
// trampoline config layout) run against the host `std`, the same split the
// teacher's own `lib.rs` used to gate its test configuration.
#[cfg(test)]
#[macro_use]
extern crate std;

pub mod arch;
pub mod config;
pub mod dispatch;
pub mod firmware;
pub mod logging;
pub mod mm;
pub mod panic;
pub mod queue;
pub mod smp;

use core::sync::atomic::{AtomicBool, Ordering};

use queue::JobQueue;

/// The single job queue shared by the bootstrap core (producer) and every
/// application processor (consumer). It lives at a fixed static address so
/// that interrupt handlers and AP entry code, neither of which carry any
/// context pointer, can reach it without indirection through a CPU-local slot.
pub static JOB_QUEUE: JobQueue = JobQueue::new();

/// Ordered list of every logical processor's local APIC ID, populated once by
/// `firmware::acpi::parse_acpi` and read thereafter by `smp` and `dispatch`.
pub static CORE_TABLE: arch::core_table::CoreTable = arch::core_table::CoreTable::new();

/// A single byte the bootstrap core polls after issuing INIT-SIPI-SIPI to an
/// application processor. The AP writes `1` with release semantics as the very
/// last step of its long-mode entry trampoline.
pub static RUN_CORE_STARTED_FLAG: AtomicBool = AtomicBool::new(false);

/// Entry point for the bootstrap processor, reached from `main.rs` after
/// `firmware::handoff` has exited boot services and handed the heap to
/// `mm::bump::init`. Runs C2 through C7 in dependency order and never
/// returns.
pub fn boot_processor_main(
    framebuffer: firmware::gop::FrameBuffer,
    apic_info: firmware::acpi::ApicInfo,
    memory_regions: alloc::vec::Vec<firmware::boot_services::MemoryRegion>,
) -> ! {
    panic::register_framebuffer(framebuffer);

    arch::paging::verify_trampoline_addresses(&memory_regions);

    let pat = arch::paging::Pat::configure();
    let mut mapper = arch::paging::Mapper::new(pat);
    mapper.map_memory_regions(&memory_regions);
    mapper.map_apic_windows(&apic_info);
    mapper.map_framebuffer(&framebuffer);
    mapper.activate();

    arch::gdt::install_bootstrap();
    arch::idt::install_bootstrap();
    arch::pic::mask_all();

    if let Some(base) = apic_info.local_apic_base {
        arch::apic::set_lapic_base(base);
    }

    let calibration = arch::apic::calibrate_timer();
    arch::apic::init_local(&calibration);
    arch::apic::route_keyboard(&apic_info);
    arch::ps2::init();

    JOB_QUEUE.init();

    smp::launch_application_processors(&apic_info, &calibration, mapper.pml4_phys_addr());

    log::info!(
        "kestrel: bring-up complete, {} core(s) online",
        CORE_TABLE.len()
    );

    idle_loop();
}

/// Entry point for every application processor, reached from the long-mode
/// stage of the SMP trampoline. Unlike the bootstrap core, an AP never takes
/// an interrupt (its IDT is left empty on purpose) and only ever consumes
/// jobs placed on the shared queue.
pub fn application_processor_main() -> ! {
    arch::gdt::install_application_processor();
    arch::idt::install_application_processor();

    RUN_CORE_STARTED_FLAG.store(true, Ordering::Release);

    dispatch::consumer_loop();
}

/// The bootstrap core's steady state once bring-up has finished: service
/// interrupts, let the timer and keyboard handlers enqueue jobs, and run jobs
/// itself between interrupts exactly like an application processor would.
fn idle_loop() -> ! {
    loop {
        if !JOB_QUEUE.run_next() {
            x86_64::instructions::hlt();
        }
    }
}
