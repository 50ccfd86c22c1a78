//! C6 — the lock-free single-producer/multi-consumer job queue. An `N`-slot
//! ring (`N` a power of two) where each slot's own sequence number is the
//! sole synchronization primitive: no separate "ready" flag, no lock. No
//! single teacher file implements this shape (hermit's scheduler is a
//! cooperative task list, not an SPMC ring); the *idiom* — `#[repr(align(64))]`
//! wrapped fields, explicit `Ordering::{Acquire,Release,Relaxed}`,
//! `core::hint::spin_loop()` — is grounded on the teacher's own
//! `core::sync::atomic` use in `arch/x86_64/kernel/idt.rs`'s init-once guard,
//! and `crossbeam_utils::CachePadded` (already a teacher dependency, used for
//! exactly this "own cache line" requirement in `scheduler/task.rs` and
//! `synch/spinlock.rs`) replaces hand-rolled padding arithmetic.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::config::{JOB_PAYLOAD_BYTES, JOB_QUEUE_LEN};

/// A job's constructed state plus the function that runs it. `run` is called
/// exactly once by the consumer that claims the slot; any resources `T`
/// constructed are expected to be released by the time `run` returns (the
/// spec's "trivially destructible" payload contract — see `SPEC_FULL.md` §4.6).
pub trait Job: Sized {
    fn run(&mut self);
}

type Runner = unsafe fn(*mut u8);

/// Cache-line-sized (64 B) slot: a 48-byte payload budget, an 8-byte runner
/// pointer, and the 4-byte sequence number with its own 4 bytes of padding.
/// The sequence number is the slot's sole ownership token — see
/// `SPEC_FULL.md` §3's "JobSlot" and §4.6's protocol description.
#[repr(align(64))]
struct Slot {
    payload: UnsafeCell<MaybeUninit<[u8; JOB_PAYLOAD_BYTES]>>,
    runner: UnsafeCell<Option<Runner>>,
    sequence: AtomicU32,
}

// Safety: all access to `payload`/`runner` is gated by `sequence`'s
// acquire/release protocol, which establishes a single owner (producer or one
// consumer) at any instant.
unsafe impl Sync for Slot {}

const _: () = assert!(core::mem::size_of::<Slot>() <= 64, "JobSlot must fit one cache line");

/// An SPMC ring of `JOB_QUEUE_LEN` slots. `head`, `tail`, and `completed` each
/// live on their own cache line (via `CachePadded`) so producer and consumer
/// traffic never false-shares a coherency unit, per `SPEC_FULL.md` §3.
pub struct JobQueue {
    slots: [Slot; JOB_QUEUE_LEN],
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    completed: CachePadded<AtomicU64>,
}

// Safety: `slots` access is mediated entirely by the sequence-number
// protocol; `head`/`tail`/`completed` are plain atomics.
unsafe impl Sync for JobQueue {}

impl JobQueue {
    /// Builds the ring with every slot's initial sequence number set to its
    /// own index, matching the `init()` contract in `SPEC_FULL.md` §4.6
    /// ("slot `i` is initialized with `sequence = i`").
    pub const fn new() -> Self {
        const fn slot(index: usize) -> Slot {
            Slot {
                payload: UnsafeCell::new(MaybeUninit::uninit()),
                runner: UnsafeCell::new(None),
                sequence: AtomicU32::new(index as u32),
            }
        }

        // `Slot` isn't `Copy` (it wraps `UnsafeCell`s), so the repeat
        // expression below re-evaluates `slot(0)` per element rather than
        // copying a single value; the loop then overwrites each with its
        // real index so every slot's sequence number starts distinct.
        let mut slots = [const { slot(0) }; JOB_QUEUE_LEN];
        let mut i = 0;
        while i < JOB_QUEUE_LEN {
            slots[i] = slot(i);
            i += 1;
        }

        Self {
            slots,
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            completed: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Re-zeros `head`/`tail`/`completed` and every slot's sequence number.
    /// Called once by the producer before any application processor is
    /// launched; never called again afterward.
    pub fn init(&self) {
        self.head.store(0, Ordering::Relaxed);
        self.tail.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        for (i, slot) in self.slots.iter().enumerate() {
            slot.sequence.store(i as u32, Ordering::Release);
        }
    }

    /// Constructs `T` in place in the next slot if the producer currently
    /// owns it (`sequence == head`). Producer-only; returns `false` if the
    /// ring is full rather than blocking — `add` is the spinning wrapper.
    pub fn try_add<T: Job + Send>(&self, value: T) -> bool {
        self.try_add_inner(value).is_ok()
    }

    /// Spins (`pause` hint) until the slot is free, then adds `value`.
    /// Producer-only. `try_add_inner` hands `value` back on failure so the
    /// retry loop doesn't need `T: Clone`.
    pub fn add<T: Job + Send>(&self, mut value: T) {
        loop {
            match self.try_add_inner(value) {
                Ok(()) => return,
                Err(returned) => {
                    value = returned;
                    core::hint::spin_loop();
                }
            }
        }
    }

    fn try_add_inner<T: Job + Send>(&self, value: T) -> Result<(), T> {
        const { assert!(core::mem::size_of::<T>() <= JOB_PAYLOAD_BYTES, "job payload exceeds the slot budget") };

        let head = self.head.load(Ordering::Relaxed);
        let index = (head % JOB_QUEUE_LEN as u64) as usize;
        let slot = &self.slots[index];

        if slot.sequence.load(Ordering::Acquire) != head as u32 {
            return Err(value);
        }

        unsafe fn run<T: Job + Send>(ptr: *mut u8) {
            // Safety: `ptr` points at a `T` this function's own monomorphization
            // constructed below; the consumer calls this exactly once.
            let value = unsafe { &mut *ptr.cast::<T>() };
            value.run();
        }

        // Safety: the sequence check above established the producer is the
        // sole owner of this slot for this lap.
        unsafe {
            (*slot.payload.get()).as_mut_ptr().cast::<T>().write(value);
            *slot.runner.get() = Some(run::<T>);
        }

        slot.sequence.store(head as u32 + 1, Ordering::Release);
        self.head.store(head + 1, Ordering::Relaxed);
        Ok(())
    }

    /// Runs one ready job if one exists. Any consumer may call this. Returns
    /// `false` if no slot is currently awaiting consumption.
    pub fn run_next(&self) -> bool {
        loop {
            let tail = self.tail.load(Ordering::Relaxed);
            let index = (tail % JOB_QUEUE_LEN as u64) as usize;
            let slot = &self.slots[index];
            let sequence = slot.sequence.load(Ordering::Acquire);

            if sequence != tail as u32 + 1 {
                return false;
            }

            if self
                .tail
                .compare_exchange_weak(tail, tail + 1, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }

            // Safety: the successful CAS above is this consumer's exclusive
            // claim on the slot; no other consumer can also have claimed it.
            unsafe {
                let runner = (*slot.runner.get()).expect("claimed slot has no runner");
                runner((*slot.payload.get()).as_mut_ptr().cast());
            }

            slot.sequence
                .store(tail as u32 + JOB_QUEUE_LEN as u32, Ordering::Release);
            self.completed.fetch_add(1, Ordering::Release);
            return true;
        }
    }

    /// `head − completed`: jobs submitted but not yet finished running.
    /// Producer-only snapshot; monotonically non-negative but may observe any
    /// in-flight value while consumers are running concurrently.
    pub fn active_count(&self) -> u64 {
        self.head.load(Ordering::Relaxed) - self.completed.load(Ordering::Acquire)
    }

    /// Spins until every submitted job has completed. Producer-only.
    pub fn wait_idle(&self) {
        while self.head.load(Ordering::Relaxed) != self.completed.load(Ordering::Acquire) {
            core::hint::spin_loop();
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicU32 as StdAtomicU32;

    struct Increment<'a> {
        counter: &'a StdAtomicU32,
    }

    impl Job for Increment<'_> {
        fn run(&mut self) {
            self.counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn single_producer_single_consumer_runs_each_job_once() {
        let queue = JobQueue::new();
        queue.init();
        let counter = StdAtomicU32::new(0);

        for _ in 0..16 {
            assert!(queue.try_add(Increment { counter: &counter }));
        }
        for _ in 0..16 {
            assert!(queue.run_next());
        }

        assert_eq!(counter.load(Ordering::Relaxed), 16);
        assert_eq!(queue.active_count(), 0);
        assert!(!queue.run_next());
    }

    #[test]
    fn try_add_fails_once_ring_is_full() {
        let queue = JobQueue::new();
        queue.init();
        let counter = StdAtomicU32::new(0);

        for _ in 0..JOB_QUEUE_LEN {
            assert!(queue.try_add(Increment { counter: &counter }));
        }
        assert!(!queue.try_add(Increment { counter: &counter }));

        assert!(queue.run_next());
        assert!(queue.try_add(Increment { counter: &counter }));
    }

    #[test]
    fn wait_idle_observes_full_completion() {
        let queue = JobQueue::new();
        queue.init();
        let counter = StdAtomicU32::new(0);

        for _ in 0..8 {
            assert!(queue.try_add(Increment { counter: &counter }));
        }
        while queue.run_next() {}
        queue.wait_idle();

        assert_eq!(queue.active_count(), 0);
        assert_eq!(counter.load(Ordering::Relaxed), 8);
    }

    #[test]
    fn run_next_is_false_when_ring_is_empty() {
        let queue = JobQueue::new();
        queue.init();
        assert!(!queue.run_next());
    }
}
