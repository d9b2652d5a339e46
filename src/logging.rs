//! This module contains the global logger instance used by the `log` crate.
//!
//! Records go to the standard error stream, one line each. Module output
//! printed through the host capability table arrives under the `module`
//! target.

use std::io::Write;

/// The static API for the logger.
pub static LOGGER_API: StderrLogger = StderrLogger;

/// A logger writing to the process' standard error stream.
///
/// It is used to interface with the `log` crate.
pub struct StderrLogger;

/// Installs the logger and sets the maximum level.
///
/// # Errors
///
/// Fails if another logger is already installed; the level is still applied.
pub fn init(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_max_level(level);
    log::set_logger(&LOGGER_API)
}

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut stderr = std::io::stderr().lock();
        // A failing standard error stream has nowhere to be reported.
        let _ = if cfg!(debug_assertions) {
            writeln!(
                stderr,
                "[{:5}] {} {}:{}: {}",
                record.level(),
                record.target(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        } else {
            writeln!(
                stderr,
                "[{:5}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        };
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
