//! C7 — Core Dispatch. An application processor's entire steady-state role:
//! find its own slot in `CORE_TABLE` by local APIC ID, then loop claiming and
//! running jobs from the shared queue forever. Grounded on the general shape
//! of the teacher's `application_processor_main()` phase sequencing in
//! `lib.rs` (locate-self, then enter a steady-state loop), generalized here
//! from a cooperative task-scheduler handoff to the job-queue consumer loop
//! this spec requires. There is no cooperation with the timer on an AP: its
//! IDT is left empty, so nothing preempts this loop.

use crate::{CORE_TABLE, JOB_QUEUE};

/// Finds this core's own index in `CORE_TABLE` by linear scan on its local
/// APIC ID. Fatal if the ID isn't present — every application processor was
/// launched from an entry in this same table, so its absence means the
/// trampoline handed control to the wrong core or `CORE_TABLE` was corrupted.
fn own_core_index() -> usize {
    let apic_id = crate::arch::apic::local_apic_id();
    match CORE_TABLE.index_of(apic_id) {
        Some(index) => index,
        None => crate::panic::fatal(crate::panic::PanicCode::Invariant),
    }
}

/// The application processor's entire life after bring-up: claim and run one
/// job at a time, spinning with a `pause` hint between empty polls. Never
/// returns, matching every other steady-state loop in this kernel.
pub fn consumer_loop() -> ! {
    let index = own_core_index();
    log::info!("dispatch: core {index} entering consumer loop");

    loop {
        if !JOB_QUEUE.run_next() {
            core::hint::spin_loop();
        }
    }
}
