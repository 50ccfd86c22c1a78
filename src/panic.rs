//! Fatal-error handling. Per `SPEC_FULL.md` §7, there is no recovery path for
//! an invariant violation during bring-up: paint the framebuffer with a code
//! identifying the failure class, disable interrupts, and spin forever.

use x86_64::instructions::interrupts;

use crate::firmware::gop::FrameBuffer;

/// Coarse classification of a fatal condition, encoded as a solid fill color
/// so the failure is visible even when serial is unavailable. Firmware-phase
/// failures (absent GOP, absent ACPI pointer, `ExitBootServices` exhaustion)
/// are not a variant here: per `SPEC_FULL.md` §7/§10.2 they are returned as a
/// `FirmwareError` instead of reaching this handler at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicCode {
    /// A bring-up invariant (memory map, MADT record, paging conflict) was
    /// violated.
    Invariant,
    /// The bump allocator ran out of heap.
    OutOfMemory,
}

impl PanicCode {
    fn color(self) -> u32 {
        match self {
            PanicCode::Invariant => 0x00FF_0000,
            PanicCode::OutOfMemory => 0x00FF_00FF,
        }
    }
}

/// The framebuffer handle used by `fatal` to paint a panic screen, set once
/// bring-up has a `FrameBuffer` to show one on.
static mut PANIC_FRAMEBUFFER: Option<FrameBuffer> = None;

/// Registers the framebuffer discovered in `firmware::gop` so a later fatal
/// condition can paint it. Must be called at most once, from the bootstrap
/// core before interrupts are enabled.
pub fn register_framebuffer(framebuffer: FrameBuffer) {
    // Safety: single-threaded at this point in bring-up.
    unsafe {
        PANIC_FRAMEBUFFER = Some(framebuffer);
    }
}

/// Fills the framebuffer (if one has been registered) with a solid color
/// identifying `code`, disables interrupts, and halts. Never returns.
pub fn fatal(code: PanicCode) -> ! {
    log::error!("fatal: {code:?}");
    interrupts::disable();

    // Safety: no other core can still be touching the framebuffer once we've
    // decided to halt the system; any AP will fault on its own empty IDT.
    if let Some(framebuffer) = unsafe { PANIC_FRAMEBUFFER.as_ref() } {
        framebuffer.fill(code.color());
    }

    halt_forever();
}

fn halt_forever() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}
