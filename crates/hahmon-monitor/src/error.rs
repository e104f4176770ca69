//! Error types for the monitor.

/// Errors that stop the monitor.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Failed to connect to or communicate with the NATS server.
    #[error("NATS error: {0}")]
    Nats(String),

    /// A source that cannot be reopened was asked for a second stream.
    #[error("message source is exhausted")]
    SourceExhausted,
}
