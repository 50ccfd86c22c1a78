//! PS/2 keyboard controller handshake: drain the output buffer, wait for the
//! input buffer to empty, enable scanning, and wait for the device's
//! acknowledgement. No teacher file speaks PS/2 directly (hermit has no
//! keyboard driver); this follows the same "drain, wait, command, ack" shape
//! `pic.rs`/`pit.rs` already use for other legacy port-mapped devices,
//! grounded on the same `x86_64::instructions::port::Port` idiom.

use x86_64::instructions::port::Port;

const DATA_PORT: u16 = 0x60;
const STATUS_COMMAND_PORT: u16 = 0x64;

const STATUS_OUTPUT_FULL: u8 = 1 << 0;
const STATUS_INPUT_FULL: u8 = 1 << 1;

const CMD_ENABLE_SCANNING: u8 = 0xF4;
const ACK: u8 = 0xFA;

/// Drains any stale byte in the controller's output buffer, waits for the
/// input buffer to empty, then sends "enable scanning" and waits for the
/// 0xFA acknowledgement. No timeout: per `SPEC_FULL.md` §4.4, the hardware is
/// assumed correct.
pub fn init() {
    let mut data: Port<u8> = Port::new(DATA_PORT);
    let mut status: Port<u8> = Port::new(STATUS_COMMAND_PORT);

    // Safety: standard PS/2 controller ports.
    unsafe {
        if status.read() & STATUS_OUTPUT_FULL != 0 {
            let _ = data.read();
        }

        while status.read() & STATUS_INPUT_FULL != 0 {}
        data.write(CMD_ENABLE_SCANNING);

        loop {
            if status.read() & STATUS_OUTPUT_FULL != 0 && data.read() == ACK {
                break;
            }
        }
    }

    log::debug!("ps2: keyboard scanning enabled");
}

/// The bootstrap-only keyboard interrupt handler. Drains the scancode and
/// acknowledges the interrupt; translating scancodes to characters is the
/// "scancode display" collaborator this spec excludes.
pub extern "C" fn handle_keyboard_interrupt() {
    let mut data: Port<u8> = Port::new(DATA_PORT);
    // Safety: standard PS/2 data port read, valid any time an IRQ1 fires.
    let _scancode: u8 = unsafe { data.read() };
    crate::arch::apic::eoi();
}
