//! `exit_boot_services()`: fetch the firmware memory map, retrying up to 16
//! times (the map key invalidates on any intervening firmware event), then
//! leave boot services for good. Grounded on the `GetMemoryMap`/
//! `ExitBootServices` usage in
//! `amoljassal-sis-kernel-showcase/crates/uefi-boot/src/main.rs`.

use alloc::vec::Vec;

use uefi::boot;
use uefi::mem::memory_map::{MemoryMap as _, MemoryMapOwned, MemoryType};

use crate::firmware::error::FirmwareError;
use crate::mm::Heap;

const MAX_ATTEMPTS: u32 = 16;

/// Fetches the memory map, retrying on a stale map key, then calls
/// `ExitBootServices`. Returns the final map so the caller can scan it for
/// the largest conventional-memory region (`mm::bump`'s job, driven from
/// `lib.rs`).
pub fn exit_boot_services() -> Result<MemoryMapOwned, FirmwareError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        // `memory_map` allocates its own buffer with one extra page of
        // headroom internally; matches the spec's "one extra page" contract
        // without this module needing to size the buffer itself.
        let map = boot::memory_map(MemoryType::LOADER_DATA);

        match map {
            Ok(map) => {
                // Safety: `exit_boot_services` consumes the exact map key
                // just obtained above; if firmware invalidated it between
                // the two calls, the attempt below fails and we retry.
                match unsafe { boot::exit_boot_services(Some(MemoryType::LOADER_DATA)) } {
                    Ok(final_map) => return Ok(final_map),
                    Err(_) if attempts < MAX_ATTEMPTS => continue,
                    Err(_) => return Err(FirmwareError::ExitBootServicesFailed { attempts }),
                }
                #[allow(unreachable_code)]
                {
                    let _ = map;
                }
            }
            Err(_) if attempts < MAX_ATTEMPTS => continue,
            Err(_) => return Err(FirmwareError::ExitBootServicesFailed { attempts }),
        }
    }
}

/// Scans a memory map for the largest contiguous conventional-memory region
/// and returns it as a `Heap`, aligning the start up and the end down to
/// 4 KiB boundaries (the descriptors themselves are always page-granular, so
/// this only matters defensively).
pub fn largest_conventional_region(map: &MemoryMapOwned) -> Result<Heap, FirmwareError> {
    map.entries()
        .filter(|d| d.ty == MemoryType::CONVENTIONAL)
        .max_by_key(|d| d.page_count)
        .map(|d| Heap {
            start: d.phys_start,
            size: d.page_count * 0x1000,
        })
        .ok_or(FirmwareError::NoConventionalMemory)
}

/// How a descriptor's memory type is treated by `arch::paging`'s mapping
/// policy (`SPEC_FULL.md` §4.3): `Ram` gets present+writable, `Mmio` also gets
/// cache-disable. Anything else (reserved, unusable, persistent memory, OEM
/// ranges) is left unmapped; the kernel never touches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    Ram,
    Mmio,
}

/// One mappable span lifted out of the firmware's memory map, after boot
/// services (and the map itself) have gone away. `conventional` records
/// whether the descriptor was specifically `CONVENTIONAL` memory, which is
/// the only kind C2's carve-outs (the SMP trampoline's fixed addresses) may
/// safely land on.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    pub phys_start: u64,
    pub page_count: u64,
    pub kind: MemoryKind,
    pub conventional: bool,
}

impl MemoryRegion {
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.phys_start && addr < self.phys_start + self.page_count * 0x1000
    }
}

/// Classifies every descriptor worth identity-mapping, per the mapping
/// policy table: conventional, ACPI reclaim/NVS, and loader/boot-services
/// code and data all map as ordinary RAM; everything else is dropped except
/// the explicit MMIO types, which the UEFI spec itself calls out as
/// memory-mapped I/O rather than RAM.
pub fn mappable_regions(map: &MemoryMapOwned) -> Vec<MemoryRegion> {
    map.entries()
        .filter_map(|d| {
            let kind = match d.ty {
                MemoryType::CONVENTIONAL
                | MemoryType::ACPI_RECLAIM
                | MemoryType::ACPI_NON_VOLATILE
                | MemoryType::LOADER_CODE
                | MemoryType::LOADER_DATA
                | MemoryType::BOOT_SERVICES_CODE
                | MemoryType::BOOT_SERVICES_DATA => MemoryKind::Ram,
                MemoryType::MMIO | MemoryType::MMIO_PORT_SPACE => MemoryKind::Mmio,
                _ => return None,
            };
            if d.page_count == 0 {
                return None;
            }
            Some(MemoryRegion {
                phys_start: d.phys_start,
                page_count: d.page_count,
                kind,
                conventional: d.ty == MemoryType::CONVENTIONAL,
            })
        })
        .collect()
}
