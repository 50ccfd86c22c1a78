//! The one place this kernel returns a `Result` instead of converting a
//! failure to a panic: firmware-phase errors, per `SPEC_FULL.md` §7/§10.2.
//! Once `exit_boot_services()` succeeds, nothing below this layer is allowed
//! to fail gracefully again.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FirmwareError {
    #[error("no Graphics Output Protocol instance available")]
    NoFramebuffer,

    #[error("no ACPI 2.0+ RSDP found in the firmware configuration table")]
    NoAcpiRsdp,

    #[error("ACPI table checksum mismatch for signature {signature:?}")]
    BadChecksum { signature: [u8; 4] },

    #[error("MADT table not present in the XSDT")]
    NoMadt,

    #[error("ExitBootServices failed after {attempts} attempts")]
    ExitBootServicesFailed { attempts: u32 },

    #[error("UEFI memory map has no conventional-memory region")]
    NoConventionalMemory,
}
