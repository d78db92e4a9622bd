//! Error handling for the peerlink core
//!
//! Transport- and I/O-level failures are handled locally by the component
//! that owns them (the session transitions to its closed/failed state and
//! exactly one notification is emitted); they are never propagated across
//! task boundaries as panics. The variants here cover the operations that
//! do return errors to the caller.

use thiserror::Error;

/// Result type for peerlink operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// Errors that can occur during peerlink operations
#[derive(Error, Debug)]
pub enum LinkError {
    /// I/O error (socket, platform endpoint, config file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A device token could not be parsed
    ///
    /// Returned by [`crate::PeerDevice::from_str`] for malformed input.
    /// Parsing never constructs a partial device.
    #[error("invalid device token: {0}")]
    InvalidToken(String),

    /// A connection request named a transport with no registered binding
    #[error("unknown transport: {0}")]
    UnknownTransport(String),

    /// Another connection attempt is already in flight
    ///
    /// The orchestrator allows at most one live session; a request for a
    /// second device is refused until the current one resolves.
    #[error("connection busy: {active} is already in progress")]
    ConnectBusy {
        /// Device currently holding the session slot
        active: String,
    },

    /// Configuration is invalid or missing
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl LinkError {
    /// Check if this error is recoverable (transient, can be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LinkError::Io(_) | LinkError::ConnectBusy { .. })
    }
}
