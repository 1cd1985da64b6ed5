//! Error types for the metro environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    /// A control operation was issued to a ticker that has been stopped
    #[error("Ticker has been stopped")]
    TickerStopped,

    /// The receiving side of a channel is gone
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Context operation failed
    #[error("Context error: {0}")]
    ContextError(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a channel-closed error.
    pub fn closed(channel: impl Into<String>) -> Self {
        Self::ChannelClosed(channel.into())
    }

    /// Creates a context error.
    pub fn context(msg: impl std::fmt::Display) -> Self {
        Self::ContextError(msg.to_string())
    }
}
