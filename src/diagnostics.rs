//! Diagnostic sink collaborator.
//!
//! The corrector reports what it did through a [`DiagnosticSink`]. Messages
//! are fire-and-forget: nothing returned by a sink influences the correction.

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticLevel {
    Trace,
    Debug,
    Info,
    Warn,
}

/// Receiver of leveled diagnostic text.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, level: DiagnosticLevel, message: &str);
}

/// Forwards diagnostics to `tracing` under the `ephys_baseline` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, level: DiagnosticLevel, message: &str) {
        match level {
            DiagnosticLevel::Trace => tracing::trace!(target: "ephys_baseline", "{}", message),
            DiagnosticLevel::Debug => tracing::debug!(target: "ephys_baseline", "{}", message),
            DiagnosticLevel::Info => tracing::info!(target: "ephys_baseline", "{}", message),
            DiagnosticLevel::Warn => tracing::warn!(target: "ephys_baseline", "{}", message),
        }
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for std::sync::Arc<S> {
    fn emit(&self, level: DiagnosticLevel, message: &str) {
        (**self).emit(level, message)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&self, _level: DiagnosticLevel, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(DiagnosticLevel::Trace < DiagnosticLevel::Debug);
        assert!(DiagnosticLevel::Info < DiagnosticLevel::Warn);
    }

    #[test]
    fn test_sinks_accept_every_level_without_subscriber() {
        let sinks: [&dyn DiagnosticSink; 2] = [&TracingSink, &NullSink];
        for sink in sinks {
            for level in [
                DiagnosticLevel::Trace,
                DiagnosticLevel::Debug,
                DiagnosticLevel::Info,
                DiagnosticLevel::Warn,
            ] {
                sink.emit(level, "pass 1: 12 windows");
            }
        }
    }
}
