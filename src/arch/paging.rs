//! Four-level identity-mapped paging (PML4 → PDPT → PD → PT), with 2 MiB
//! huge pages wherever both the address and the remaining length are
//! 2 MiB-aligned. Flag encoding is grounded on the teacher's
//! `PageTableEntryFlags` bitflags (`present()`/`writable()`/`.device()`-style
//! builders over a `bitflags` set), generalized here to also carry the
//! write-combining attribute this spec requires for the framebuffer.

use bitflags::bitflags;
use x86_64::registers::model_specific::Msr;
use x86_64::structures::paging::{PageTable, PageTableFlags as RawFlags};
use x86_64::{PhysAddr, VirtAddr};

use crate::config::{
    DEFAULT_IOAPIC_BASE, DEFAULT_LAPIC_BASE, PROTECTED_MODE_PD, PROTECTED_MODE_PDPT,
    TRAMPOLINE_DEST,
};
use crate::firmware::acpi::ApicInfo;
use crate::firmware::boot_services::{MemoryKind, MemoryRegion};
use crate::firmware::gop::FrameBuffer;
use crate::mm::bump;
use crate::panic::{fatal, PanicCode};

bitflags! {
    /// Semantic mapping flags this kernel's callers choose from. `WRITE_COMBINING`
    /// is a single bit regardless of page size; `Mapper::set_entry` is the only
    /// place that knows it lands at bit 7 on a 4 KiB PTE and bit 12 on a 2 MiB
    /// PDE, per `SPEC_FULL.md` §9 — callers must never pass the PAT bit directly.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct MapFlags: u32 {
        const WRITABLE        = 1 << 0;
        const CACHE_DISABLE   = 1 << 1;
        const WRITE_COMBINING = 1 << 2;
    }
}

impl MapFlags {
    pub const RAM: Self = Self::WRITABLE;
    pub const MMIO: Self = Self::WRITABLE.union(Self::CACHE_DISABLE);
    pub const FRAMEBUFFER: Self = Self::WRITABLE.union(Self::WRITE_COMBINING);
}

/// PAT index 4 is programmed to write-combining (value `0x01`); indices 0–3
/// keep their architectural defaults. Must be configured before CR3 is
/// loaded with the tables this module builds — no cache flush is needed if
/// that ordering is respected (Intel SDM; see `SPEC_FULL.md` §9).
pub struct Pat;

impl Pat {
    const IA32_PAT: u32 = 0x0277;
    /// The architectural reset value (`0x0007_0406_0007_0406`: PA0=WB, PA1=WT,
    /// PA2=UC-, PA3=UC repeated across both halves) with only PA4 changed,
    /// from its default WB (`0x06`) to WC (`0x01`). PA0-3 and PA5-7 must stay
    /// at their defaults per `SPEC_FULL.md` §4.3/§9: PA2=UC- in particular is
    /// the entry a PTE with `PCD` set and no `PAT` bit selects, which is
    /// exactly the encoding `Mapper::set_entry` uses for `MapFlags::MMIO` —
    /// including the APIC windows, which must land on an uncached PAT entry,
    /// not write-back.
    const VALUE: u64 = 0x0007_0401_0007_0406;

    pub fn configure() -> Self {
        let mut msr = Msr::new(Self::IA32_PAT);
        // Safety: writing a well-known MSR with a value matching the PAT's
        // documented field layout, before any page table using PAT index 4
        // is installed.
        unsafe {
            msr.write(Self::VALUE);
        }
        log::debug!("pat: index 4 configured for write-combining");
        Pat
    }
}

/// Owns the kernel's single top-level PML4 and builds the identity map.
/// Lower-level tables (PDPT/PD/PT) are bump-allocated on demand, never freed,
/// matching the bump allocator's own "irreversible" contract.
pub struct Mapper {
    pml4: &'static mut PageTable,
    _pat: Pat,
}

/// The top-level table lives at a statically aligned location inside the
/// kernel image rather than being bump-allocated, so it exists before the
/// bump allocator has been initialized by the earliest mapping calls.
#[repr(align(4096))]
struct Pml4Storage(PageTable);

static mut PML4_STORAGE: Pml4Storage = Pml4Storage(PageTable::new());

impl Mapper {
    pub fn new(pat: Pat) -> Self {
        // Safety: single-threaded bring-up; no other core exists yet.
        let pml4 = unsafe { &mut *core::ptr::addr_of_mut!(PML4_STORAGE.0) };
        Self { pml4, _pat: pat }
    }

    /// Maps every region the firmware memory map reported as conventional
    /// RAM, ACPI reclaim/NVS, or loader/boot-services code and data, present
    /// and writable, plus any region the firmware itself called out as MMIO,
    /// cache-disabled — per the mapping policy table in `SPEC_FULL.md` §4.3.
    /// The per-descriptor classification lives in `firmware::boot_services`;
    /// this just applies the corresponding `MapFlags` to each span.
    pub fn map_memory_regions(&mut self, regions: &[MemoryRegion]) {
        for region in regions {
            let flags = match region.kind {
                MemoryKind::Ram => MapFlags::RAM,
                MemoryKind::Mmio => MapFlags::MMIO,
            };
            self.map_range(region.phys_start, region.page_count * 0x1000, flags);
        }
    }

    /// Maps the LAPIC and I/O APIC MMIO windows, cache-disabled, per
    /// `SPEC_FULL.md`'s data model invariant that both must be mapped with
    /// cache-disabled attributes before first access.
    pub fn map_apic_windows(&mut self, apic_info: &ApicInfo) {
        let lapic = apic_info.local_apic_base.unwrap_or(DEFAULT_LAPIC_BASE);
        let ioapic = apic_info
            .io_apics
            .first()
            .map(|e| u64::from(e.address))
            .unwrap_or(DEFAULT_IOAPIC_BASE);
        self.map_range(lapic, 0x1000, MapFlags::MMIO);
        self.map_range(ioapic, 0x1000, MapFlags::MMIO);
    }

    /// Maps the framebuffer with write-combining, per the mapping policy.
    pub fn map_framebuffer(&mut self, framebuffer: &FrameBuffer) {
        let bytes = u64::from(framebuffer.stride) * u64::from(framebuffer.height) * 4;
        self.map_range(framebuffer.pixels, bytes, MapFlags::FRAMEBUFFER);
    }

    /// The physical address of this kernel's own top-level PML4, handed to
    /// `smp::launch_application_processors` for the trampoline's long-mode
    /// stage to load into CR3 once it leaves the throwaway protected-mode
    /// identity map behind.
    pub fn pml4_phys_addr(&self) -> u64 {
        core::ptr::addr_of!(*self.pml4) as u64
    }

    /// Loads CR3 with this mapper's PML4. Must run after every region the
    /// kernel will ever touch has been mapped; there is no fault handler to
    /// page anything in lazily.
    pub fn activate(&self) {
        use x86_64::registers::control::{Cr3, Cr3Flags};
        let frame = x86_64::structures::paging::PhysFrame::containing_address(PhysAddr::new(
            core::ptr::addr_of!(*self.pml4) as u64,
        ));
        // Safety: the table just built identity-maps everything the kernel
        // has touched or will touch before the next mapping call.
        unsafe {
            Cr3::write(frame, Cr3Flags::empty());
        }
        log::info!("paging: CR3 loaded");
    }

    /// Maps `[phys, phys+bytes)` to itself with `flags`. Uses 2 MiB huge
    /// pages whenever both `phys` and the remaining length are 2 MiB-aligned;
    /// otherwise walks down to 4 KiB pages. Idempotent under identical flags;
    /// a conflicting re-map of an existing huge page is fatal.
    pub fn map_range(&mut self, phys: u64, bytes: u64, flags: MapFlags) {
        const HUGE_PAGE: u64 = 0x20_0000;
        let end = phys.checked_add(bytes).unwrap_or(u64::MAX);
        let mut addr = phys & !(0xFFF);
        while addr < end {
            let remaining = end - addr;
            if addr % HUGE_PAGE == 0 && remaining >= HUGE_PAGE {
                self.map_huge_page(addr, flags);
                addr += HUGE_PAGE;
            } else {
                self.map_small_page(addr, flags);
                addr += 0x1000;
            }
        }
    }

    fn map_huge_page(&mut self, phys: u64, flags: MapFlags) {
        let (pdpt_index, pd_index) = huge_page_indices(phys);
        let pml4_index = pml4_index(phys);
        let pdpt = table_or_alloc(self.pml4, pml4_index);
        let pd = table_or_alloc(pdpt, pdpt_index);

        let entry = &mut pd[pd_index];
        let mut raw = RawFlags::PRESENT | RawFlags::WRITABLE | RawFlags::HUGE_PAGE;
        if flags.contains(MapFlags::CACHE_DISABLE) {
            raw |= RawFlags::NO_CACHE;
        }
        if flags.contains(MapFlags::WRITE_COMBINING) {
            // PAT bit for a 2 MiB PDE is bit 12, which `x86_64`'s
            // `PageTableFlags` does not name; OR it in on the raw bits.
            raw |= RawFlags::from_bits_truncate(1 << 12);
        }

        if !entry.is_unused() {
            let existing = entry.flags();
            if existing == raw {
                return; // idempotent re-map under identical flags
            }
            fatal(PanicCode::Invariant);
        }

        entry.set_addr(PhysAddr::new(phys), raw);
    }

    fn map_small_page(&mut self, phys: u64, flags: MapFlags) {
        let pml4_index = pml4_index(phys);
        let pdpt_index = pdpt_index(phys);
        let pd_index = pd_index(phys);
        let pt_index = pt_index(phys);

        let pdpt = table_or_alloc(self.pml4, pml4_index);
        let pd = table_or_alloc(pdpt, pdpt_index);
        let pt = table_or_alloc(pd, pd_index);

        let entry = &mut pt[pt_index];
        let mut raw = RawFlags::PRESENT | RawFlags::WRITABLE;
        if flags.contains(MapFlags::CACHE_DISABLE) {
            raw |= RawFlags::NO_CACHE;
        }
        if flags.contains(MapFlags::WRITE_COMBINING) {
            // PAT bit for a 4 KiB PTE is bit 7.
            raw |= RawFlags::from_bits_truncate(1 << 7);
        }

        if !entry.is_unused() {
            if entry.flags() == raw {
                return;
            }
            fatal(PanicCode::Invariant);
        }

        entry.set_addr(PhysAddr::new(phys), raw);
    }

}

/// C2's handoff contract: the SMP trampoline's three fixed physical addresses
/// (the blob itself and its throwaway protected-mode page tables) must each
/// lie within a region the firmware reported as `CONVENTIONAL` memory, or
/// nothing guarantees they are free to overwrite. Fails fatally otherwise,
/// per `SPEC_FULL.md` §4.1/§4.2.
pub fn verify_trampoline_addresses(regions: &[MemoryRegion]) {
    for addr in [TRAMPOLINE_DEST, PROTECTED_MODE_PDPT, PROTECTED_MODE_PD] {
        let in_conventional_memory = regions.iter().any(|r| r.conventional && r.contains(addr));
        if !in_conventional_memory {
            log::error!("paging: trampoline address {addr:#x} is not in conventional memory");
            fatal(PanicCode::Invariant);
        }
    }
}

/// Returns the next-level table at `index` within `table`, bump-allocating a
/// fresh zeroed one if the entry is not yet present.
fn table_or_alloc(table: &mut PageTable, index: usize) -> &'static mut PageTable {
    let entry = &mut table[index];
    if entry.is_unused() {
        let frame = bump::allocate_pages(1);
        entry.set_addr(
            PhysAddr::new(frame as u64),
            RawFlags::PRESENT | RawFlags::WRITABLE,
        );
    }
    let addr = entry.addr().as_u64();
    // Safety: identity mapping means the physical address of the next-level
    // table is also its virtual address, and the frame was either just
    // zeroed by the bump allocator or was already a valid table.
    unsafe { &mut *(addr as *mut PageTable) }
}

fn pml4_index(addr: u64) -> usize {
    VirtAddr::new(addr).p4_index().into()
}
fn pdpt_index(addr: u64) -> usize {
    VirtAddr::new(addr).p3_index().into()
}
fn pd_index(addr: u64) -> usize {
    VirtAddr::new(addr).p2_index().into()
}
fn pt_index(addr: u64) -> usize {
    VirtAddr::new(addr).p1_index().into()
}
fn huge_page_indices(addr: u64) -> (usize, usize) {
    (pdpt_index(addr), pd_index(addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_flags_compose() {
        let fb = MapFlags::FRAMEBUFFER;
        assert!(fb.contains(MapFlags::WRITABLE));
        assert!(fb.contains(MapFlags::WRITE_COMBINING));
        assert!(!fb.contains(MapFlags::CACHE_DISABLE));
    }

    #[test]
    fn memory_region_contains_is_half_open() {
        let region = MemoryRegion {
            phys_start: 0x8000,
            page_count: 1,
            kind: MemoryKind::Ram,
            conventional: true,
        };
        assert!(region.contains(0x8000));
        assert!(region.contains(0x8FFF));
        assert!(!region.contains(0x9000));
    }

    #[test]
    fn index_decomposition_round_trips() {
        let addr = 0x1234_5600_0000u64 & !0xFFF;
        let v = VirtAddr::new(addr);
        assert_eq!(pml4_index(addr), usize::from(v.p4_index()));
        assert_eq!(pdpt_index(addr), usize::from(v.p3_index()));
        assert_eq!(pd_index(addr), usize::from(v.p2_index()));
        assert_eq!(pt_index(addr), usize::from(v.p1_index()));
    }
}
