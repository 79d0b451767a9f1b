use std::fmt;

/// Severity attached to a message sent to an [`EventSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Warning,
    Severe,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("INFO"),
            Severity::Warning => f.write_str("WARNING"),
            Severity::Severe => f.write_str("SEVERE"),
        }
    }
}

/// Where the storage layer reports conditions the host has to act on.
///
/// Only an unrecoverable connection reaches this sink; ordinary statement failures are
/// returned as results and logged.
pub trait EventSink: Send + Sync + 'static {
    fn log(&self, severity: Severity, message: &str);

    /// Ask the host to shut down. The storage layer never terminates the process itself.
    fn request_shutdown(&self);
}

/// Default sink: forwards everything to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => tracing::info!("{message}"),
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Severe => tracing::error!(%severity, "{message}"),
        }
    }

    fn request_shutdown(&self) {
        tracing::error!("storage requested host shutdown");
    }
}
