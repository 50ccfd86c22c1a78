//! UEFI entry point. Runs C1 (locate the framebuffer, parse ACPI, exit boot
//! services) and on success hands off to `kestrel::boot_processor_main` for
//! everything from the bump allocator through core dispatch — which never
//! returns. A firmware-phase failure is the one place this kernel returns an
//! error instead of panicking: it logs the cause and hands a non-success
//! `Status` back to firmware, per `SPEC_FULL.md` §7/§10.2.
//!
//! The two lang items every freestanding binary must define exactly once —
//! `#[global_allocator]` and `#[panic_handler]` — live here rather than in
//! `kestrel` itself, so the library stays an ordinary linkable crate that a
//! `std`-hosted test binary can depend on without a lang-item clash.

#![no_std]
#![no_main]

extern crate alloc;

use core::panic::PanicInfo;

use kestrel::mm::bump::GlobalBumpAllocator;
use kestrel::panic::{fatal, PanicCode};
use uefi::Status;

#[global_allocator]
static GLOBAL_ALLOCATOR: GlobalBumpAllocator = GlobalBumpAllocator;

#[panic_handler]
fn panic(info: &PanicInfo<'_>) -> ! {
    log::error!("panic: {info}");
    fatal(PanicCode::Invariant)
}

#[uefi::entry]
fn efi_main() -> Status {
    kestrel::logging::init();

    match kestrel::firmware::handoff() {
        Ok((framebuffer, apic_info, memory_regions)) => {
            kestrel::boot_processor_main(framebuffer, apic_info, memory_regions)
        }
        Err(error) => {
            log::error!("firmware handoff failed: {error}");
            Status::ABORTED
        }
    }
}
