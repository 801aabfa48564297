//! Error types for the NatNet client.
//!
//! All errors implement `std::error::Error` and carry enough structured context to
//! decide how the client should react:
//!
//! ## Error Categories
//!
//! - **Connect failures**: address resolution or socket bind failed while starting a session
//! - **Malformed packets**: a single datagram could not be decoded; the stream continues
//! - **Unsupported versions**: the server speaks a NatNet major version this decoder does not know
//! - **Socket errors**: an I/O failure on one channel; that channel is closed
//! - **Configuration errors**: invalid values in a [`ClientConfig`](crate::ClientConfig)
//!
//! ## Recovery
//!
//! ```rust
//! use natnet::NatNetError;
//!
//! let error = NatNetError::malformed("FrameOfData", "payload truncated");
//! assert!(error.is_recoverable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use thiserror::Error;

use crate::transport::Channel;
use crate::types::Version;

/// Result type alias for NatNet operations.
pub type Result<T, E = NatNetError> = std::result::Result<T, E>;

/// Main error type for NatNet operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum NatNetError {
    #[error("Failed to start NatNet session: {reason}")]
    ConnectFailure {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Malformed packet in {context}: {details}")]
    MalformedPacket { context: String, details: String },

    #[error("Unsupported NatNet protocol version {found}")]
    UnsupportedVersion { found: Version },

    #[error("Socket error on {channel} channel")]
    Socket {
        channel: Channel,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Cannot {operation}: command channel is closed")]
    NotConnected { operation: String },
}

impl NatNetError {
    /// Returns whether the receive loop can continue after this error.
    ///
    /// Only per-datagram decode failures are recoverable; everything else stops
    /// at least one channel.
    pub fn is_recoverable(&self) -> bool {
        match self {
            NatNetError::MalformedPacket { .. } => true,
            NatNetError::ConnectFailure { .. } => false,
            NatNetError::UnsupportedVersion { .. } => false,
            NatNetError::Socket { .. } => false,
            NatNetError::Config { .. } => false,
            NatNetError::NotConnected { .. } => false,
        }
    }

    /// Returns whether this error ends the session until an explicit re-initialization.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NatNetError::ConnectFailure { .. }
                | NatNetError::Socket { .. }
                | NatNetError::NotConnected { .. }
        )
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            NatNetError::ConnectFailure { .. } => vec![
                "Check the server address and that the host resolves",
                "Make sure the local bind address belongs to this machine",
                "Verify no other process holds the data port without SO_REUSEADDR",
            ],
            NatNetError::MalformedPacket { .. } => vec![
                "Check for packet corruption on the network path",
                "Verify the server streams a supported NatNet version",
            ],
            NatNetError::UnsupportedVersion { .. } => vec![
                "Configure the server to stream NatNet 2.x",
                "Update this library to a version that understands the server",
            ],
            NatNetError::Socket { .. } => vec![
                "Check that the tracking server is still running",
                "Re-initialize the client to open new sockets",
            ],
            NatNetError::Config { .. } => vec![
                "Check the configuration file syntax",
                "Use a finite, non-zero scale factor",
            ],
            NatNetError::NotConnected { .. } => vec![
                "Re-initialize the client before sending commands",
            ],
        }
    }

    /// Helper constructor for connect failures.
    pub fn connect_failed(reason: impl Into<String>) -> Self {
        NatNetError::ConnectFailure { reason: reason.into(), source: None }
    }

    /// Helper constructor for connect failures with source.
    pub fn connect_failed_with_source(
        reason: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        NatNetError::ConnectFailure { reason: reason.into(), source: Some(source.into()) }
    }

    /// Helper constructor for malformed packet errors.
    pub fn malformed(context: impl Into<String>, details: impl Into<String>) -> Self {
        NatNetError::MalformedPacket { context: context.into(), details: details.into() }
    }

    /// Helper constructor for socket errors.
    pub fn socket_error(channel: Channel, source: std::io::Error) -> Self {
        NatNetError::Socket { channel, source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        NatNetError::Config { reason: reason.into() }
    }
}

impl From<serde_yaml_ng::Error> for NatNetError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        NatNetError::Config { reason: err.to_string() }
    }
}
