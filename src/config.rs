//! Build-time constants. One `pub const` per tunable, gathered in one place
//! rather than scattered as magic numbers through the subsystems that use
//! them — the same layout the upstream kernel this workspace started from
//! uses for its own stack-size constants.

/// Physical address of the SMP trampoline blob. Fixed by the 16-bit SIPI
/// vector format (`vector = address >> 12`), so it must be 4 KiB-aligned and
/// fit in 8 bits once shifted.
pub const TRAMPOLINE_DEST: u64 = 0x8000;

/// Byte offset of the embedded `TrampolineConfig` record within the
/// trampoline blob, matching the `.org 0x0F00` placed just before
/// `trampoline_config:` in `src/smp/trampoline.s`.
pub const TRAMPOLINE_CONFIG_OFFSET: u64 = 0x0F00;

/// Physical address of the protected-mode PDPT the trampoline's 32-bit stage
/// loads into CR3. Identity-maps the first 2 MiB so the trampoline code and
/// these very page tables stay mapped across the PE transition.
pub const PROTECTED_MODE_PDPT: u64 = 0x1_0000;

/// Physical address of the single-entry protected-mode page directory backing
/// `PROTECTED_MODE_PDPT`.
pub const PROTECTED_MODE_PD: u64 = 0x1_1000;

/// Default local APIC MMIO base, overridden by a MADT type-5 record if present.
pub const DEFAULT_LAPIC_BASE: u64 = 0xFEE0_0000;

/// Default I/O APIC MMIO base, overridden by the MADT's own type-1 records.
pub const DEFAULT_IOAPIC_BASE: u64 = 0xFEC0_0000;

/// Default keyboard GSI, overridden by a MADT type-2 interrupt source override
/// whose `source == 1`.
pub const DEFAULT_KEYBOARD_GSI: u32 = 1;

/// IDT vector the LAPIC timer is routed to.
pub const TIMER_VECTOR: u8 = 32;

/// IDT vector the keyboard GSI is routed to.
pub const KEYBOARD_VECTOR: u8 = 33;

/// Periodic LAPIC timer rate. `apic_ticks_per_second / TIMER_HZ` is the
/// initial count programmed into the LAPIC's timer initial-count register.
pub const TIMER_HZ: u64 = 2;

/// PIT calibration window, in PIT ticks, corresponding to ~10 ms at the PIT's
/// 1.193182 MHz input clock.
pub const PIT_CALIBRATION_TICKS: u16 = 11_932;

/// Per-core stack size handed to each application processor by the SMP
/// launcher, matching the upstream kernel's own `KERNEL_STACK_SIZE`.
pub const AP_STACK_SIZE: u64 = 0x8000;

/// Maximum number of logical processors this kernel can track. A MADT with
/// more enabled/online-capable local APIC entries than this is a fatal
/// overflow, per the firmware-handoff invariant.
pub const MAX_CORES: usize = 256;

/// Maximum number of I/O APICs this kernel can track while parsing the MADT.
pub const MAX_IOAPICS: usize = 8;

/// Number of slots in the job queue. Must be a power of two.
pub const JOB_QUEUE_LEN: usize = 256;

/// Per-slot payload budget in bytes. A job's constructed state must fit here.
pub const JOB_PAYLOAD_BYTES: usize = 48;

/// COM1 I/O port, used only for out-of-band diagnostics via the `log` crate.
pub const SERIAL_COM1_BASE: u16 = 0x3F8;

/// COM1 baud rate.
pub const SERIAL_BAUD: u32 = 38_400;
