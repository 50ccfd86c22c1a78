//! Exercises the two pieces of bring-up state that survive unchanged between
//! a real MADT walk and a host test: `CoreTable` (what `firmware::acpi`
//! populates from local-APIC MADT records) and `JobQueue` (what every core
//! drains afterward). Both types are plain atomics over fixed-size arrays —
//! no allocation, no MMIO, no UEFI config table — so they run the same way
//! here as they do on real bring-up.

use std::sync::atomic::{AtomicU32, Ordering};

use kestrel::arch::core_table::CoreTable;
use kestrel::queue::{Job, JobQueue};

struct RecordApicId<'a> {
    target: &'a AtomicU32,
    apic_id: u32,
}

impl Job for RecordApicId<'_> {
    fn run(&mut self) {
        self.target.store(self.apic_id, Ordering::Relaxed);
    }
}

/// Mirrors what `firmware::acpi::parse_madt` does for every enabled/
/// online-capable type-0 record: push the APIC ID, in MADT order.
#[test]
fn core_table_preserves_madt_record_order() {
    let table = CoreTable::new();
    for apic_id in [0, 2, 4, 6] {
        table.push(apic_id);
    }

    assert_eq!(table.len(), 4);
    assert_eq!(table.get(0), Some(0));
    assert_eq!(table.get(3), Some(6));
    assert_eq!(table.get(4), None);
    assert_eq!(table.index_of(4), Some(2));
    assert!(table.has_distinct_ids());
}

/// A MADT with two local-APIC records reporting the same ID is malformed;
/// `boot_processor_main` treats this as fatal before ever reaching the SMP
/// launcher, so this is the property bring-up checks before anything else
/// runs on those IDs.
#[test]
fn core_table_flags_duplicate_apic_ids() {
    let table = CoreTable::new();
    table.push(1);
    table.push(3);
    table.push(1);
    assert!(!table.has_distinct_ids());
}

/// One job per discovered core, run in submission order — the shape of the
/// handoff between `smp::launch_application_processors` populating work for
/// a newly-launched core and that core's own `dispatch::consumer_loop`.
#[test]
fn queue_delivers_one_job_per_core_in_order() {
    let table = CoreTable::new();
    for apic_id in [0, 2, 4] {
        table.push(apic_id);
    }

    let queue = JobQueue::new();
    queue.init();

    let slots: Vec<AtomicU32> = (0..table.len()).map(|_| AtomicU32::new(u32::MAX)).collect();
    for i in 0..table.len() {
        let apic_id = table.get(i).unwrap();
        queue.add(RecordApicId {
            target: &slots[i],
            apic_id,
        });
    }

    assert_eq!(queue.active_count(), u64::try_from(table.len()).unwrap());
    while queue.run_next() {}
    queue.wait_idle();

    for i in 0..table.len() {
        assert_eq!(slots[i].load(Ordering::Relaxed), table.get(i).unwrap());
    }
}
