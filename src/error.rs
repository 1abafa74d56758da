//! Error types for the connection engine.
//!
//! This module defines the error conditions a connection can encounter.
//! Transient conditions such as `WouldBlock` are not modelled here: they are
//! ordinary reactor yields, handled inside the engine and never surfaced.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur on a connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The connection is closing or closed and can no longer transmit.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A frame announced by the codec exceeds the configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Announced frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The codec could not determine a valid frame boundary.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The send buffer is at capacity and the payload was dropped.
    #[error("Send buffer full: {queued} bytes queued (max: {max})")]
    SendBufferFull {
        /// Bytes currently queued.
        queued: usize,
        /// Configured capacity.
        max: usize,
    },

    /// Codec encode/decode failure.
    #[error("Codec error: {0}")]
    Codec(String),

    /// TLS negotiation failed.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// TLS configuration or key material problem.
    #[error("TLS error: {0}")]
    Tls(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::FrameTooLarge {
            size: 20_000_000,
            max: 10_485_760,
        };
        assert_eq!(
            err.to_string(),
            "Frame too large: 20000000 bytes (max: 10485760)"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_clone() {
        let err = Error::SendBufferFull {
            queued: 2048,
            max: 1024,
        };
        let cloned = err.clone();
        assert_eq!(err, cloned);
    }
}
