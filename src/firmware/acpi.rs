//! ACPI 2.0+ RSDP discovery, XSDT walk, and MADT parsing. Grounded on the
//! teacher's `src/arch/x86_64/kernel/acpi.rs` (`AcpiRsdp`/`AcpiSdtHeader`
//! layouts, the "UEFI already mapped these tables" shortcut) and
//! `src/arch/x86_64/kernel/apic.rs` (MADT record struct layouts: local APIC,
//! I/O APIC, interrupt source override, local APIC address override).

use uefi::system;
use uefi::table::cfg::ACPI2_GUID;

use crate::config::{DEFAULT_IOAPIC_BASE, DEFAULT_KEYBOARD_GSI, DEFAULT_LAPIC_BASE, MAX_IOAPICS};
use crate::firmware::error::FirmwareError;

/// `{gsi, flags}`. `flags` bit 13 = active-low polarity, bit 15 = level
/// trigger, matching the I/O APIC redirection-entry layout directly so no
/// further translation is needed when programming the redirection table.
#[derive(Debug, Clone, Copy)]
pub struct KeyboardConfig {
    pub gsi: u32,
    pub flags: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct IoApicEntry {
    pub id: u8,
    pub address: u32,
    pub gsi_base: u32,
}

/// Everything `firmware::acpi::parse_acpi` discovers, handed to bring-up as
/// one value. `CORE_TABLE` (a separate static, populated as a side effect of
/// the same MADT walk) is not part of this struct because interrupt stubs
/// and application processors need to reach it without a context pointer.
#[derive(Debug, Clone, Copy)]
pub struct ApicInfo {
    pub local_apic_base: Option<u64>,
    pub io_apics: IoApicList,
    pub keyboard: KeyboardConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct IoApicList {
    entries: [IoApicEntry; MAX_IOAPICS],
    len: usize,
}

impl IoApicList {
    const EMPTY: IoApicEntry = IoApicEntry {
        id: 0,
        address: 0,
        gsi_base: 0,
    };

    fn new() -> Self {
        Self {
            entries: [Self::EMPTY; MAX_IOAPICS],
            len: 0,
        }
    }

    fn push(&mut self, entry: IoApicEntry) {
        if self.len >= MAX_IOAPICS {
            crate::panic::fatal(crate::panic::PanicCode::Invariant);
        }
        self.entries[self.len] = entry;
        self.len += 1;
    }

    pub fn first(&self) -> Option<&IoApicEntry> {
        self.entries[..self.len].first()
    }

    /// The I/O APIC serving `gsi`: the one whose `gsi_base` is the greatest
    /// value `<= gsi`. Per `SPEC_FULL.md` §4.1, this (not "first match") is
    /// the correct rule for multi-IOAPIC systems.
    pub fn serving(&self, gsi: u32) -> Option<&IoApicEntry> {
        self.entries[..self.len]
            .iter()
            .filter(|e| e.gsi_base <= gsi)
            .max_by_key(|e| e.gsi_base)
    }
}

#[repr(C, packed)]
struct Rsdp {
    signature: [u8; 8],
    checksum: u8,
    oem_id: [u8; 6],
    revision: u8,
    rsdt_address: u32,
    length: u32,
    xsdt_address: u64,
    extended_checksum: u8,
    reserved: [u8; 3],
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct SdtHeader {
    signature: [u8; 4],
    length: u32,
    revision: u8,
    checksum: u8,
    oem_id: [u8; 6],
    oem_table_id: [u8; 8],
    oem_revision: u32,
    creator_id: u32,
    creator_revision: u32,
}

fn checksum_ok(base: *const u8, len: usize) -> bool {
    let mut sum: u8 = 0;
    for i in 0..len {
        // Safety: caller guarantees `[base, base+len)` is a valid ACPI table
        // as found in UEFI's configuration table, which this kernel's
        // identity-mapped firmware regions already cover.
        sum = sum.wrapping_add(unsafe { *base.add(i) });
    }
    sum == 0
}

/// Locates the ACPI 2.0+ RSDP via the UEFI configuration table, byte-matching
/// the GUID to avoid any alignment assumption about the table entries. Scans
/// the table in place rather than copying it: this runs before
/// `mm::bump::init` has anywhere to allocate from.
fn find_rsdp() -> Result<*const Rsdp, FirmwareError> {
    let target = ACPI2_GUID.as_bytes();
    system::with_config_table(|table| {
        table
            .iter()
            .find(|entry| entry.guid.as_bytes() == target)
            .map(|entry| entry.address as *const Rsdp)
    })
    .ok_or(FirmwareError::NoAcpiRsdp)
}

/// Walks the firmware configuration table for the ACPI 2.0+ RSDP, follows
/// its XSDT, validates checksums, and parses the MADT. Populates
/// `crate::CORE_TABLE` as a side effect of the type-0 (local APIC) walk.
pub fn parse_acpi() -> Result<ApicInfo, FirmwareError> {
    let rsdp = find_rsdp()?;

    // Safety: `rsdp` was found via the firmware's own ACPI2 GUID entry; UEFI
    // identity-maps this region for us prior to `ExitBootServices`.
    let rsdp_ref = unsafe { &*rsdp };
    if !checksum_ok(rsdp as *const u8, rsdp_ref.length as usize) {
        return Err(FirmwareError::BadChecksum {
            signature: *b"RSD ",
        });
    }

    let xsdt_header = rsdp_ref.xsdt_address as *const SdtHeader;
    // Safety: `xsdt_address` is a physical address UEFI maps identically for
    // its own table access prior to `ExitBootServices`.
    let xsdt_ref = unsafe { &*xsdt_header };
    if !checksum_ok(xsdt_header as *const u8, xsdt_ref.length as usize) {
        return Err(FirmwareError::BadChecksum {
            signature: xsdt_ref.signature,
        });
    }

    let entry_count = (xsdt_ref.length as usize - core::mem::size_of::<SdtHeader>()) / 8;
    let entries_ptr = unsafe { (xsdt_header as *const u8).add(core::mem::size_of::<SdtHeader>()) }
        as *const u64;

    let mut madt: Option<*const u8> = None;
    for i in 0..entry_count {
        // Safety: within the validated XSDT's own entry array.
        let table_addr = unsafe { core::ptr::read_unaligned(entries_ptr.add(i)) };
        let header = table_addr as *const SdtHeader;
        // Safety: every XSDT entry points at a valid ACPI table per the ACPI
        // specification; the enclosing table already passed its checksum.
        let header_ref = unsafe { &*header };
        if &header_ref.signature == b"APIC" {
            madt = Some(table_addr as *const u8);
            break;
        }
    }

    let madt = madt.ok_or(FirmwareError::NoMadt)?;
    // Safety: `madt` points at a table whose header we just read above.
    let madt_header = unsafe { &*(madt as *const SdtHeader) };
    if !checksum_ok(madt, madt_header.length as usize) {
        return Err(FirmwareError::BadChecksum {
            signature: *b"APIC",
        });
    }

    Ok(parse_madt(madt, madt_header.length as usize))
}

/// Fixed MADT record header: `{type, length}`, common to every record kind.
#[repr(C, packed)]
struct RecordHeader {
    kind: u8,
    length: u8,
}

const TYPE_LOCAL_APIC: u8 = 0;
const TYPE_IO_APIC: u8 = 1;
const TYPE_INTERRUPT_SOURCE_OVERRIDE: u8 = 2;
const TYPE_LOCAL_APIC_ADDRESS_OVERRIDE: u8 = 5;

fn parse_madt(madt: *const u8, table_len: usize) -> ApicInfo {
    // MADT body: `{local_apic_address: u32, flags: u32}` then a packed
    // sequence of variable-length records, starting right after the common
    // SDT header.
    let body_offset = core::mem::size_of::<SdtHeader>() + 8;
    let mut offset = body_offset;

    let mut io_apics = IoApicList::new();
    let mut local_apic_override: Option<u64> = None;
    let mut keyboard = KeyboardConfig {
        gsi: DEFAULT_KEYBOARD_GSI,
        flags: 0,
    };

    while offset + core::mem::size_of::<RecordHeader>() <= table_len {
        // Safety: `offset` stays within `[0, table_len)` by the loop guard,
        // and `table_len` came from a checksum-validated table.
        let header = unsafe { &*(madt.add(offset) as *const RecordHeader) };
        let record_len = header.length as usize;
        if record_len < core::mem::size_of::<RecordHeader>() {
            // A zero/undersized record length would spin forever.
            crate::panic::fatal(crate::panic::PanicCode::Invariant);
        }

        match header.kind {
            TYPE_LOCAL_APIC => {
                #[repr(C, packed)]
                struct LocalApic {
                    header: RecordHeader,
                    _acpi_processor_id: u8,
                    apic_id: u8,
                    flags: u32,
                }
                // Safety: `record_len` was validated above to cover at least
                // the common header; MADT-conformant producers size type-0
                // records to fit `LocalApic` exactly.
                let record = unsafe { &*(madt.add(offset) as *const LocalApic) };
                const ENABLED: u32 = 1 << 0;
                const ONLINE_CAPABLE: u32 = 1 << 1;
                if record.flags & (ENABLED | ONLINE_CAPABLE) != 0 {
                    crate::CORE_TABLE.push(u32::from(record.apic_id));
                }
            }
            TYPE_IO_APIC => {
                #[repr(C, packed)]
                struct IoApic {
                    header: RecordHeader,
                    id: u8,
                    _reserved: u8,
                    address: u32,
                    gsi_base: u32,
                }
                let record = unsafe { &*(madt.add(offset) as *const IoApic) };
                io_apics.push(IoApicEntry {
                    id: record.id,
                    address: record.address,
                    gsi_base: record.gsi_base,
                });
            }
            TYPE_INTERRUPT_SOURCE_OVERRIDE => {
                #[repr(C, packed)]
                struct Iso {
                    header: RecordHeader,
                    _bus: u8,
                    source: u8,
                    gsi: u32,
                    flags: u16,
                }
                let record = unsafe { &*(madt.add(offset) as *const Iso) };
                if record.source == 1 {
                    const ACTIVE_LOW: u16 = 0b11;
                    const LEVEL_TRIGGERED: u16 = 0b1100;
                    let polarity = record.flags & 0b11;
                    let trigger = (record.flags >> 2) & 0b11;
                    let mut flags = 0u32;
                    if polarity == (ACTIVE_LOW & 0b11) {
                        flags |= 1 << 13;
                    }
                    if trigger == ((LEVEL_TRIGGERED >> 2) & 0b11) {
                        flags |= 1 << 15;
                    }
                    keyboard = KeyboardConfig {
                        gsi: record.gsi,
                        flags,
                    };
                }
            }
            TYPE_LOCAL_APIC_ADDRESS_OVERRIDE => {
                #[repr(C, packed)]
                struct LocalApicAddressOverride {
                    header: RecordHeader,
                    _reserved: u16,
                    address: u64,
                }
                let record =
                    unsafe { &*(madt.add(offset) as *const LocalApicAddressOverride) };
                local_apic_override = Some(record.address);
            }
            _ => {}
        }

        offset += record_len;
    }

    if !crate::CORE_TABLE.has_distinct_ids() {
        crate::panic::fatal(crate::panic::PanicCode::Invariant);
    }

    ApicInfo {
        local_apic_base: local_apic_override.or(Some(DEFAULT_LAPIC_BASE)),
        io_apics,
        keyboard,
    }
}

/// The I/O APIC serving the keyboard GSI, falling back to the architectural
/// default address if the MADT reported none (a firmware conformance bug we
/// tolerate rather than fail bring-up over, since the default almost always
/// matches real hardware).
pub fn keyboard_ioapic(info: &ApicInfo) -> (u32, u32) {
    match info.io_apics.serving(info.keyboard.gsi) {
        Some(entry) => (entry.address, entry.gsi_base),
        None => (DEFAULT_IOAPIC_BASE as u32, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_apic_list_picks_highest_base_leq_gsi() {
        let mut list = IoApicList::new();
        list.push(IoApicEntry {
            id: 0,
            address: 0xFEC0_0000,
            gsi_base: 0,
        });
        list.push(IoApicEntry {
            id: 1,
            address: 0xFEC0_1000,
            gsi_base: 24,
        });
        assert_eq!(list.serving(2).unwrap().gsi_base, 0);
        assert_eq!(list.serving(30).unwrap().gsi_base, 24);
    }

    #[test]
    fn keyboard_flags_encode_polarity_and_trigger() {
        // Active-low, level-triggered: polarity bits `0b11`, trigger bits `0b11`.
        let flags: u16 = 0b1111;
        let polarity = flags & 0b11;
        let trigger = (flags >> 2) & 0b11;
        assert_eq!(polarity, 0b11);
        assert_eq!(trigger, 0b11);
    }
}
