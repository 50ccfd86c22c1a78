//! Legacy 8259 PIC: remapped once so its vectors don't collide with CPU
//! exceptions, then fully masked before the LAPIC takes over. Grounded on
//! `src/arch/x86_64/kernel/pic.rs` (port constants, remap sequence), ported
//! from the teacher's legacy `x86::io` free functions to the `x86_64`
//! crate's `Port` type — the modern idiom the same tree already uses in its
//! own `serial.rs`.

use x86_64::instructions::port::Port;

const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

const PIC1_OFFSET: u8 = 32;
const PIC2_OFFSET: u8 = 40;

const ICW1_INIT: u8 = 0x11;

/// Remaps IRQ 0..15 to vectors 32..47 (off the CPU exception range) and then
/// masks every line — `SPEC_FULL.md` §4.4 requires all lines masked (0xFF to
/// both data ports) before the LAPIC is enabled.
pub fn mask_all() {
    let mut cmd1: Port<u8> = Port::new(PIC1_COMMAND);
    let mut cmd2: Port<u8> = Port::new(PIC2_COMMAND);
    let mut data1: Port<u8> = Port::new(PIC1_DATA);
    let mut data2: Port<u8> = Port::new(PIC2_DATA);

    // Safety: these are the standard, architecturally fixed PIC I/O ports.
    unsafe {
        cmd1.write(ICW1_INIT);
        cmd2.write(ICW1_INIT);

        data1.write(PIC1_OFFSET);
        data2.write(PIC2_OFFSET);

        data1.write(0x04); // PIC1 has a slave on IRQ2
        data2.write(0x02); // PIC2's cascade identity

        data1.write(0x01); // 8086 mode
        data2.write(0x01);

        data1.write(0xFF);
        data2.write(0xFF);
    }

    log::debug!("pic: remapped to vectors {PIC1_OFFSET}..{}, fully masked", PIC1_OFFSET as u16 + 16);
}
