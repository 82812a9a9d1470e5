//! A console-backed implementation of the `log` facade.

use log::{LevelFilter, Metadata, Record};

use crate::config::DEFAULT_LOG_LEVEL;
use crate::timer;

static LOGGER: Logger = Logger;

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let ticks = timer::ticks();
        crate::println!("[{:>8}] {:>5}: {}", ticks, record.level(), record.args());
    }

    fn flush(&self) {}
}

pub fn init() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(DEFAULT_LOG_LEVEL.to_level_filter());
}

/// Raises or lowers verbosity; the kernel command line drives this.
pub fn set_level(level: LevelFilter) {
    log::set_max_level(level);
}
