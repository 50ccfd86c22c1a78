//! A three-descriptor GDT: null, 64-bit kernel code, kernel data. Built with
//! the `x86_64` crate's `GlobalDescriptorTable`, which already implements the
//! register-load-then-far-return idiom this spec calls for via
//! `CS::set_reg`/`lgdt` — the modern idiom the teacher's own tree uses
//! elsewhere (`serial.rs`'s `Port` type, `pic.rs`'s `set_handler_fn`), in
//! place of the legacy `x86`-crate GDT builder its own `gdt.rs` still used.

use x86_64::instructions::segmentation::{Segment, CS, DS, ES, SS};
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};

/// Every core loads the same descriptor *contents*; each core gets its own
/// `GlobalDescriptorTable` instance loaded into its own GDTR, since the GDTR
/// is per-core state and there is no shared TSS in this design (this kernel
/// has no task-switching, so it needs none).
fn build() -> (GlobalDescriptorTable, SegmentSelector, SegmentSelector) {
    let mut gdt = GlobalDescriptorTable::new();
    let code = gdt.append(Descriptor::kernel_code_segment());
    let data = gdt.append(Descriptor::kernel_data_segment());
    (gdt, code, data)
}

/// Installs the GDT on the bootstrap core. Identical to
/// `install_application_processor` bar the log line: distinguished because
/// the bootstrap core additionally assumes data segments were never loaded
/// before (an AP starts from protected mode, which the trampoline already
/// took care of).
pub fn install_bootstrap() {
    install();
    log::debug!("gdt: installed on bootstrap core");
}

/// Installs the GDT on an application processor, right after the trampoline
/// hands control to `application_processor_main`.
pub fn install_application_processor() {
    install();
}

fn install() {
    let (gdt, code, data) = build();

    // Leaked deliberately: the GDT must outlive the core that loaded it for
    // as long as that core runs, which for every core here is forever.
    let gdt: &'static GlobalDescriptorTable = alloc::boxed::Box::leak(alloc::boxed::Box::new(gdt));
    gdt.load();

    // Safety: `code`/`data` are the selectors `gdt.append` just handed back
    // for the descriptors now loaded into this core's GDTR.
    unsafe {
        CS::set_reg(code);
        DS::set_reg(data);
        ES::set_reg(data);
        SS::set_reg(data);
    }
}
