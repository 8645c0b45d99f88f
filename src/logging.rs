//! Logger setup for binaries built on this crate.
//!
//! The library itself only talks to the `log` facade.

use flexi_logger::{DeferredNow, FlexiLoggerError, Logger, LoggerHandle};

/// Start logging to stderr at `level` (a `log` spec such as `"info"` or
/// `"mailpool=debug"`). Keep the returned handle alive for the program's
/// lifetime.
pub fn init_logging(level: &str) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_str(level)?.format(thread_format).start()
}

// Format: "HH:MM:SS.fff INF [mailpool-worker-0] message"
fn thread_format(
    w: &mut dyn std::io::Write,
    now: &mut DeferredNow,
    record: &log::Record,
) -> Result<(), std::io::Error> {
    let level_abbr = match record.level() {
        log::Level::Error => "ERR",
        log::Level::Warn => "WRN",
        log::Level::Info => "INF",
        log::Level::Debug => "DBG",
        log::Level::Trace => "TRC",
    };

    write!(
        w,
        "{} {} [{}] {}",
        now.format("%H:%M:%S%.3f"),
        level_abbr,
        std::thread::current().name().unwrap_or("<unnamed>"),
        record.args()
    )
}
