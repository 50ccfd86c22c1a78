//! C5 — SMP Launcher. Places the real-mode/protected-mode/long-mode
//! trampoline (`trampoline.s`) at its fixed physical destination, then drives
//! one AP at a time through INIT-SIPI-SIPI, handing each its own stack and
//! the kernel's real long-mode page tables via the embedded
//! `TrampolineConfig` record. Grounded on the teacher's
//! `src/arch/x86_64/kernel/apic.rs` (`boot_application_processors()`'s ICR
//! write sequence and `udelay`-based spacing between INIT and the two
//! SIPIs); the trampoline mechanism itself (`build.rs` assembling
//! `trampoline.s` into a flat binary embedded with `include_bytes!`) mirrors
//! the teacher's own `assemble_x86_64_smp_boot` for `boot.s`.

use core::sync::atomic::Ordering;

use x86_64::structures::paging::{PageTable, PageTableFlags};
use x86_64::PhysAddr;

use crate::arch::apic::{self, Calibration};
use crate::config::{
    AP_STACK_SIZE, PROTECTED_MODE_PD, PROTECTED_MODE_PDPT, TRAMPOLINE_CONFIG_OFFSET,
    TRAMPOLINE_DEST,
};
use crate::firmware::acpi::ApicInfo;
use crate::mm::bump;
use crate::{application_processor_main, CORE_TABLE, RUN_CORE_STARTED_FLAG};

/// The assembled trampoline, linked flat at `TRAMPOLINE_DEST` by `build.rs`.
/// Only one instance ever exists in memory; `write_config` overwrites the
/// embedded record between APs and this same copy is reused.
static TRAMPOLINE_BLOB: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/trampoline.bin"));

/// `{protected_mode_pdpt, stack_top, task_entry, long_mode_pml4}`, written at
/// `TRAMPOLINE_CONFIG_OFFSET` inside the blob for the 32-bit stage to read
/// via a base+displacement load (`SPEC_FULL.md` §6).
#[repr(C)]
struct TrampolineConfig {
    protected_mode_pdpt: u64,
    stack_top: u64,
    task_entry: u64,
    long_mode_pml4: u64,
}

/// Builds the throwaway protected-mode PDPT/PD identity-mapping the first
/// 2 MiB — covering the trampoline blob itself and these very tables — that
/// the 32-bit stage loads into CR3 before long mode is reachable. Runs once,
/// before the first AP is launched.
fn build_protected_mode_tables() {
    // Safety: `arch::paging::verify_trampoline_addresses` already confirmed
    // these fixed addresses lie in conventional memory the kernel's own
    // identity map covers present + writable, so they're valid targets for a
    // raw pointer write.
    let pdpt = unsafe { &mut *(PROTECTED_MODE_PDPT as *mut PageTable) };
    let pd = unsafe { &mut *(PROTECTED_MODE_PD as *mut PageTable) };

    *pdpt = PageTable::new();
    *pd = PageTable::new();

    pdpt[0].set_addr(
        PhysAddr::new(PROTECTED_MODE_PD),
        PageTableFlags::PRESENT | PageTableFlags::WRITABLE,
    );
    pd[0].set_addr(
        PhysAddr::new(0),
        PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::HUGE_PAGE,
    );
}

/// Copies the trampoline blob to `TRAMPOLINE_DEST`. Runs once; every AP is
/// woken into the same copy.
fn install_trampoline() {
    let dest = TRAMPOLINE_DEST as *mut u8;
    // Safety: `TRAMPOLINE_DEST` was verified conventional memory, already
    // mapped present + writable by C3.
    unsafe {
        core::ptr::copy_nonoverlapping(TRAMPOLINE_BLOB.as_ptr(), dest, TRAMPOLINE_BLOB.len());
    }
}

/// Overwrites the embedded `TrampolineConfig` record ahead of launching the
/// next AP.
fn write_config(stack_top: u64, long_mode_pml4: u64) {
    let config = TrampolineConfig {
        protected_mode_pdpt: PROTECTED_MODE_PDPT,
        stack_top,
        task_entry: application_processor_main as u64,
        long_mode_pml4,
    };
    let dest = (TRAMPOLINE_DEST + TRAMPOLINE_CONFIG_OFFSET) as *mut TrampolineConfig;
    // Safety: `install_trampoline` already copied the blob, whose
    // `.org 0x0F00` reserves exactly 32 bytes at this offset for this record.
    unsafe {
        core::ptr::write_unaligned(dest, config);
    }
}

/// Spins reading the TSC against the ticks-per-second captured by
/// `apic::calibrate_timer`, per `SPEC_FULL.md` §4.5.
fn delay_us(calibration: &Calibration, microseconds: u64) {
    let ticks = calibration.tsc_ticks_per_second / 1_000_000 * microseconds;
    let start = apic::read_tsc();
    while apic::read_tsc() - start < ticks {
        core::hint::spin_loop();
    }
}

/// Drives one AP through INIT-SIPI-SIPI. Polls ICR delivery-status
/// indefinitely between writes and never times out — per `SPEC_FULL.md` §5,
/// hardware correctness is assumed here, not verified.
fn send_init_sipi(apic_id: u32, calibration: &Calibration) {
    let sipi_vector = ((TRAMPOLINE_DEST >> 12) & 0xFF) as u32;

    // Safety: the bootstrap's own LAPIC window was mapped cache-disabled by
    // `arch::paging::Mapper::map_apic_windows` before bring-up ever reaches
    // this launcher.
    unsafe {
        apic::write_icr(apic_id, 0x0000_4500); // INIT
    }
    while apic::icr_delivery_pending() {
        core::hint::spin_loop();
    }
    delay_us(calibration, 10_000);

    for _ in 0..2 {
        // Safety: same LAPIC window.
        unsafe {
            apic::write_icr(apic_id, 0x0000_4600 | sipi_vector); // SIPI
        }
        while apic::icr_delivery_pending() {
            core::hint::spin_loop();
        }
        delay_us(calibration, 200);
    }
}

/// C5 end to end: place the trampoline once, then for every entry in
/// `CORE_TABLE` other than the bootstrap's own APIC ID, allocate a stack,
/// publish its `TrampolineConfig`, and drive INIT-SIPI-SIPI. Only one AP is
/// ever in flight — the launcher waits for `RUN_CORE_STARTED_FLAG` before
/// moving to the next. If an AP never sets it, this spins forever, matching
/// the "correctness assumed, no timeouts" posture of `SPEC_FULL.md` §5.
pub fn launch_application_processors(
    _apic_info: &ApicInfo,
    calibration: &Calibration,
    long_mode_pml4: u64,
) {
    let bootstrap_id = apic::local_apic_id();

    build_protected_mode_tables();
    install_trampoline();

    for index in 0..CORE_TABLE.len() {
        let Some(apic_id) = CORE_TABLE.get(index) else {
            continue;
        };
        if apic_id == bootstrap_id {
            continue;
        }

        let stack = bump::allocate_pages(AP_STACK_SIZE / 0x1000);
        let stack_top = stack as u64 + AP_STACK_SIZE;

        RUN_CORE_STARTED_FLAG.store(false, Ordering::Release);
        write_config(stack_top, long_mode_pml4);

        log::info!("smp: launching core {apic_id} (index {index})");
        send_init_sipi(apic_id, calibration);

        while !RUN_CORE_STARTED_FLAG.load(Ordering::Acquire) {
            core::hint::spin_loop();
        }
        log::info!("smp: core {apic_id} online");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trampoline_config_layout_matches_spec_offsets() {
        assert_eq!(core::mem::size_of::<TrampolineConfig>(), 32);
        assert_eq!(core::mem::offset_of!(TrampolineConfig, protected_mode_pdpt), 0);
        assert_eq!(core::mem::offset_of!(TrampolineConfig, stack_top), 8);
        assert_eq!(core::mem::offset_of!(TrampolineConfig, task_entry), 16);
        assert_eq!(core::mem::offset_of!(TrampolineConfig, long_mode_pml4), 24);
    }

    #[test]
    fn sipi_vector_fits_the_16_bit_real_mode_format() {
        let vector = (TRAMPOLINE_DEST >> 12) & 0xFF;
        assert_eq!(vector, 0x08);
        assert!(vector <= 0xFF);
    }
}
