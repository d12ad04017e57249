//! Logging backend (§1: out of scope as a subsystem, interface only;
//! grounded on `log.go`'s `Logger` interface and `LvlDebug` default).
//!
//! The facade logs its own lifecycle events (listen addresses, transport
//! start/stop, registration failures, panics) through a `Logger`. The
//! default forwards to `tracing`, matching the idiom used across the
//! reference pack's server examples; `log-custom(logger)` installs a
//! caller-supplied implementation instead.

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// The logging interface the facade and transports depend on. Out of scope
/// as a subsystem per §1 — this crate does not ship log rotation, file
/// sinks, or structured-field support beyond what `tracing` already does;
/// `log-file(path, level)` is a thin convenience over a `tracing` file
/// appender layer, constructed by the caller and installed as a
/// `log-custom` logger if finer control is needed.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }
    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }
    fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }
    fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }
}

/// Default logger: forwards to `tracing`. Non-silent to stderr via
/// whatever subscriber the host process installs (§6 default: "debug,
/// non-silent to stderr").
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::Debug => tracing::debug!("{message}"),
            Level::Info => tracing::info!("{message}"),
            Level::Warn => tracing::warn!("{message}"),
            Level::Error => tracing::error!("{message}"),
        }
    }
}

/// A logger that discards everything, backing `log-file`'s `silent` mode
/// and tests that don't want log noise.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentLogger;

impl Logger for SilentLogger {
    fn log(&self, _level: Level, _message: &str) {}
}

pub type SharedLogger = Arc<dyn Logger>;

pub fn default_logger() -> SharedLogger {
    Arc::new(TracingLogger)
}
