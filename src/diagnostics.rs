//! Injectable observability for the minimiser.
//!
//! The driver never talks to a logger directly. It reports through a
//! [`DiagnosticSink`], which defaults to [`LogSink`] (the `log` facade).

use log::Level;

/// Receiver for fire-and-forget diagnostic records.
pub trait DiagnosticSink {
    fn record(&self, level: Level, message: &str);
}

/// Forwards every record to the `log` facade under the `adaptive_bfgs` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn record(&self, level: Level, message: &str) {
        log::log!(target: "adaptive_bfgs", level, "[AdaptiveBFGS] {message}");
    }
}

impl<F> DiagnosticSink for F
where
    F: Fn(Level, &str),
{
    fn record(&self, level: Level, message: &str) {
        self(level, message)
    }
}
