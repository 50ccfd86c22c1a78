//! A `log::Log` implementation writing formatted records to the COM1 serial
//! port. The teacher's own `logging.rs` predates its dependency on the `log`
//! crate and rolls a hand-written `printlog!` macro system instead; this
//! workspace's root `Cargo.toml` already depends on `log`, so that hand-rolled
//! system is not reused — this is a fresh implementation of the same "one
//! global logger, written once during bring-up" shape.

use core::cell::UnsafeCell;
use core::fmt::Write;
use core::sync::atomic::{AtomicBool, Ordering};

use log::{Level, LevelFilter, Metadata, Record};
use uart_16550::SerialPort;

use crate::config::SERIAL_COM1_BASE;

/// Default log level. There is no environment to read a level from this early
/// — `ExitBootServices` hasn't happened yet when the logger is installed — so
/// this is a compile-time choice rather than a runtime one.
const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

/// A lock cheap enough to take from an interrupt handler: a single
/// compare-and-swap guard, the same shape the teacher uses for its IDT
/// one-time-install guard in `idt.rs`.
struct SpinLock<T> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

// Safety: access to `value` is only ever granted while `locked` is held.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        // Safety: the spin loop above established exclusive access.
        let result = f(unsafe { &mut *self.value.get() });
        self.locked.store(false, Ordering::Release);
        result
    }
}

struct SerialLogger {
    port: SpinLock<Option<SerialPort>>,
}

static LOGGER: SerialLogger = SerialLogger {
    port: SpinLock::new(None),
};

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= DEFAULT_LEVEL
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.port.with(|port| {
            if let Some(port) = port {
                let _ = writeln!(port, "[{}] {}", level_tag(record.level()), record.args());
            }
        });
    }

    fn flush(&self) {}
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN ",
        Level::Info => "INFO ",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

/// Initializes COM1 at 38400 8-N-1 and installs the global logger. Masks the
/// UART's own interrupt line first: one draft of the source this spec was
/// distilled from leaves it unmasked, but doing so before the IDT exists risks
/// an unhandled interrupt, so this implementation masks it — see
/// `SPEC_FULL.md` §9.
///
/// Must run exactly once, before the first `log::info!`/`warn!`/etc. call.
pub fn init() {
    // Safety: COM1 is not yet owned by anything else this early in bring-up.
    let mut port = unsafe { SerialPort::new(SERIAL_COM1_BASE) };
    port.init();

    LOGGER.port.with(|slot| *slot = Some(port));

    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(DEFAULT_LEVEL))
        .expect("logger installed twice");
}
