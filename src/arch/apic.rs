//! Local APIC and I/O APIC MMIO access: timer calibration via the legacy
//! PIT, periodic timer programming, keyboard GSI routing, and the raw ICR
//! writes the SMP launcher (`smp` module) drives for INIT-SIPI-SIPI.
//! Grounded on `src/arch/x86_64/kernel/apic.rs` (`calibrate_timer()`,
//! register offset constants, `boot_application_processors()`'s ICR
//! sequence).

use core::sync::atomic::{AtomicU64, Ordering};

use crate::config::{
    DEFAULT_LAPIC_BASE, KEYBOARD_VECTOR, PIT_CALIBRATION_TICKS, TIMER_HZ, TIMER_VECTOR,
};
use crate::firmware::acpi::{keyboard_ioapic, ApicInfo};

// LAPIC register offsets (`SPEC_FULL.md` §6).
const LAPIC_ID: u64 = 0x020;
const LAPIC_EOI: u64 = 0x0B0;
const LAPIC_SVR: u64 = 0x0F0;
const LAPIC_ICR_LOW: u64 = 0x300;
const LAPIC_ICR_HIGH: u64 = 0x310;
const LAPIC_LVT_TIMER: u64 = 0x320;
const LAPIC_INITIAL_COUNT: u64 = 0x380;
const LAPIC_CURRENT_COUNT: u64 = 0x390;
const LAPIC_DIVIDE_CONFIG: u64 = 0x3E0;

// I/O APIC index/data window offsets.
const IOAPIC_INDEX: u64 = 0x00;
const IOAPIC_DATA: u64 = 0x10;

/// The LAPIC's MMIO base, set once bring-up has parsed the MADT. Every core
/// has its own physical LAPIC, but they all sit at the same identity-mapped
/// virtual address, so one global is enough.
static LAPIC_BASE: AtomicU64 = AtomicU64::new(DEFAULT_LAPIC_BASE);

pub fn set_lapic_base(base: u64) {
    LAPIC_BASE.store(base, Ordering::Release);
}

fn lapic_base() -> u64 {
    LAPIC_BASE.load(Ordering::Acquire)
}

/// Safety: callers must have already mapped the LAPIC window cache-disabled
/// via `arch::paging::Mapper::map_apic_windows`.
unsafe fn lapic_read(offset: u64) -> u32 {
    unsafe { core::ptr::read_volatile((lapic_base() + offset) as *const u32) }
}

unsafe fn lapic_write(offset: u64, value: u32) {
    unsafe { core::ptr::write_volatile((lapic_base() + offset) as *mut u32, value) }
}

unsafe fn ioapic_write(base: u64, register: u32, value: u32) {
    unsafe {
        core::ptr::write_volatile((base + IOAPIC_INDEX) as *mut u32, register);
        core::ptr::write_volatile((base + IOAPIC_DATA) as *mut u32, value);
    }
}

/// Result of `calibrate_timer`: ticks-per-second for both the LAPIC's own
/// counter and the TSC, captured across the same PIT-timed window so
/// `smp::delay_us` can use the latter.
#[derive(Debug, Clone, Copy)]
pub struct Calibration {
    pub apic_ticks_per_second: u64,
    pub tsc_ticks_per_second: u64,
}

/// Sets the LAPIC timer to its maximum count, times a ~10 ms window against
/// the legacy PIT's terminal-count mode, and derives both the LAPIC's and the
/// TSC's ticks-per-second from the same window.
pub fn calibrate_timer() -> Calibration {
    const MAX_COUNT: u32 = u32::MAX;

    // Safety: the LAPIC window was mapped cache-disabled before this runs.
    unsafe {
        lapic_write(LAPIC_DIVIDE_CONFIG, 0b1011); // divide by 1
        lapic_write(LAPIC_INITIAL_COUNT, MAX_COUNT);
    }

    let tsc_start = read_tsc();
    crate::arch::pit::start_oneshot_calibration(PIT_CALIBRATION_TICKS);
    crate::arch::pit::wait_for_terminal_count();
    let tsc_end = read_tsc();

    // Safety: same LAPIC window.
    let remaining = unsafe { lapic_read(LAPIC_CURRENT_COUNT) };
    let elapsed_apic_ticks = u64::from(MAX_COUNT - remaining);

    // The calibration window is ~10ms; scale the elapsed ticks to a full
    // second exactly as `SPEC_FULL.md` §4.4 specifies: `(max - remaining) × 100`.
    let apic_ticks_per_second = elapsed_apic_ticks * 100;
    let tsc_ticks_per_second = (tsc_end - tsc_start) * 100;

    log::debug!(
        "apic: calibrated {apic_ticks_per_second} apic-ticks/s, {tsc_ticks_per_second} tsc-ticks/s"
    );

    Calibration {
        apic_ticks_per_second,
        tsc_ticks_per_second,
    }
}

/// Exposed for `smp::delay_us`, which spins the TSC against the same
/// calibration this function produces.
pub(crate) fn read_tsc() -> u64 {
    // Safety: `rdtsc` is unprivileged and always available on x86_64.
    unsafe { core::arch::x86_64::_rdtsc() }
}

/// Programs the LAPIC timer for periodic firing at `TIMER_HZ` and unmasks it
/// at `TIMER_VECTOR`. Also sets the spurious-interrupt vector and the APIC
/// enable bit in the SVR, since nothing else in this design does.
pub fn init_local(calibration: &Calibration) {
    let initial_count = (calibration.apic_ticks_per_second / TIMER_HZ) as u32;

    // Safety: LAPIC window mapped cache-disabled prior to this call.
    unsafe {
        lapic_write(LAPIC_SVR, 0x100 | 0xFF); // software-enable, spurious vector 0xFF
        lapic_write(LAPIC_LVT_TIMER, u32::from(TIMER_VECTOR) | (1 << 17)); // periodic
        lapic_write(LAPIC_DIVIDE_CONFIG, 0b1011);
        lapic_write(LAPIC_INITIAL_COUNT, initial_count);
    }

    log::info!("apic: local timer programmed for {TIMER_HZ} Hz");
}

/// Writes the keyboard GSI's redirection entry on the I/O APIC serving it,
/// destined at the bootstrap APIC ID.
pub fn route_keyboard(apic_info: &ApicInfo) {
    let (ioapic_base, gsi_base) = keyboard_ioapic(apic_info);
    let redir_index = apic_info.keyboard.gsi - gsi_base;
    let low = u32::from(KEYBOARD_VECTOR) | apic_info.keyboard.flags;
    let destination = local_apic_id();
    let high = destination << 24;

    // Safety: the I/O APIC window was mapped cache-disabled prior to this.
    unsafe {
        ioapic_write(u64::from(ioapic_base), 0x10 + redir_index * 2, low);
        ioapic_write(u64::from(ioapic_base), 0x10 + redir_index * 2 + 1, high);
    }

    log::info!(
        "apic: keyboard GSI {} routed to vector {KEYBOARD_VECTOR} on core {destination}",
        apic_info.keyboard.gsi
    );
}

/// The calling core's own LAPIC ID, read from register 0x020 (bits 24..32).
pub fn local_apic_id() -> u32 {
    // Safety: the LAPIC window is mapped on every core by the time this is
    // ever called (the bootstrap maps it before AP launch; identity mapping
    // means the same virtual address works on every core).
    unsafe { lapic_read(LAPIC_ID) >> 24 }
}

/// Writes the Interrupt Command Register, used by `smp` for INIT-SIPI-SIPI.
/// Safety: caller must poll `icr_delivery_pending` before issuing a further
/// command to the same target, per the Intel SDM.
pub unsafe fn write_icr(apic_id: u32, command: u32) {
    unsafe {
        lapic_write(LAPIC_ICR_HIGH, apic_id << 24);
        lapic_write(LAPIC_ICR_LOW, command);
    }
}

/// `true` while the LAPIC is still delivering the last ICR write (bit 12).
pub fn icr_delivery_pending() -> bool {
    // Safety: read-only MMIO access to an already-mapped window.
    (unsafe { lapic_read(LAPIC_ICR_LOW) } & (1 << 12)) != 0
}

/// Signals end-of-interrupt; until this write lands, same- or
/// lower-priority interrupts are inhibited by the LAPIC.
pub fn eoi() {
    // Safety: LAPIC window mapped for the duration of the kernel's life.
    unsafe {
        lapic_write(LAPIC_EOI, 0);
    }
}

/// The bootstrap-only timer interrupt handler. Services the interrupt by
/// acknowledging it and letting the job queue's producer side enqueue
/// whatever steady-state work this system exists to run — the concrete job
/// content is an external collaborator's concern, out of this spec's scope.
pub extern "C" fn handle_timer_interrupt() {
    eoi();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_scales_window_to_one_second() {
        // A ~10ms window observing 1_000_000 elapsed ticks should scale to
        // 100_000_000 ticks/s under the spec's `(max - remaining) * 100` rule.
        let elapsed = 1_000_000u64;
        assert_eq!(elapsed * 100, 100_000_000);
    }
}
