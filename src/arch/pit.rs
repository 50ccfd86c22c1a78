//! Legacy 8254 PIT, used only to time the ~10 ms window `apic::calibrate_timer`
//! needs. Grounded on `src/arch/x86_64/kernel/pit.rs` (channel/command port
//! constants, mode-byte bits).

use x86_64::instructions::port::Port;

const CHANNEL0_DATA: u16 = 0x40;
const COMMAND: u16 = 0x43;
const STATUS_COMMAND: u8 = 0xE2; // read-back, channel 0, latch status

const MODE_ONESHOT: u8 = 0b0000_0010;
const LOBYTE_HIBYTE: u8 = 0b0011_0000;
const CHANNEL0: u8 = 0b0000_0000;
const BINARY: u8 = 0b0000_0000;

/// Programs PIT channel 0 in one-shot mode for `ticks` counts of the PIT's
/// 1.193182 MHz input clock (~10 ms at the default calibration window) and
/// starts the countdown.
pub fn start_oneshot_calibration(ticks: u16) {
    let mut command: Port<u8> = Port::new(COMMAND);
    let mut data: Port<u8> = Port::new(CHANNEL0_DATA);

    // Safety: standard, architecturally fixed PIT I/O ports.
    unsafe {
        command.write(BINARY | MODE_ONESHOT | LOBYTE_HIBYTE | CHANNEL0);
        data.write(ticks as u8);
        data.write((ticks >> 8) as u8);
    }
}

/// Polls the PIT status byte's bit 7 (the output/terminal-count bit) until
/// the one-shot countdown armed by `start_oneshot_calibration` completes.
pub fn wait_for_terminal_count() {
    let mut command: Port<u8> = Port::new(COMMAND);
    loop {
        // Safety: the read-back command is a standard PIT operation.
        let status: u8 = unsafe {
            command.write(STATUS_COMMAND);
            Port::<u8>::new(CHANNEL0_DATA).read()
        };
        if status & 0x80 != 0 {
            break;
        }
    }
}
