//! C1 — Firmware Handoff. Locates the framebuffer, parses ACPI, captures the
//! memory map, and exits boot services. Everything past `handoff()` runs
//! without firmware's help; see `SPEC_FULL.md` §4.1.

pub mod acpi;
pub mod boot_services;
pub mod error;
pub mod gop;

use alloc::vec::Vec;

use acpi::ApicInfo;
use boot_services::MemoryRegion;
use error::FirmwareError;
use gop::FrameBuffer;

/// Runs C1 end to end: locate the framebuffer, parse ACPI (which also
/// populates `crate::CORE_TABLE`), then exit boot services, hand the heap
/// region to the bump allocator, and hand back the mappable region list C3
/// will identity-map. After this returns, firmware is gone for good; nothing
/// past it may call back into boot services.
///
/// Everything up to and including `largest_conventional_region` must stay
/// allocation-free: the global allocator is the bump allocator, and it has
/// nowhere to bump from until `mm::bump::init` runs below. `mm::bump::init`
/// is called here, as soon as the heap region is known, rather than left to
/// `boot_processor_main` — `mappable_regions`' `Vec` collection right after
/// it is the first allocation anywhere in bring-up. The heap region itself
/// isn't returned: nothing past this point needs it, since the allocator is
/// already live.
pub fn handoff() -> Result<(FrameBuffer, ApicInfo, Vec<MemoryRegion>), FirmwareError> {
    let framebuffer = gop::locate_framebuffer()?;
    let apic_info = acpi::parse_acpi()?;

    let map = boot_services::exit_boot_services()?;
    let heap = boot_services::largest_conventional_region(&map)?;
    crate::mm::bump::init(heap);
    let regions = boot_services::mappable_regions(&map);

    Ok((framebuffer, apic_info, regions))
}
