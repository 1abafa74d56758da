//! Configuration and limits for connections.

use crate::error::Error;

/// Per-connection configuration.
///
/// Limits bound memory usage per connection: the send buffer caps how much
/// unflushed outbound data may accumulate before payloads are dropped, and
/// the frame size caps what an inbound frame may announce before the
/// connection is torn down as misbehaving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of bytes the send buffer may hold.
    ///
    /// Crossing this threshold fires the buffer-full callback; further
    /// payloads are dropped until the buffer drains.
    ///
    /// Default: 1 MB (1 048 576)
    pub max_send_buffer_size: usize,

    /// Maximum acceptable inbound frame size in bytes.
    ///
    /// A codec announcing a larger frame is treated as a framing violation
    /// and the connection is destroyed.
    ///
    /// Default: 10 MB (10 485 760)
    pub max_frame_size: usize,

    /// Upper bound for a single non-blocking read, in bytes.
    ///
    /// Default: 65 535
    pub read_chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_send_buffer_size: 1024 * 1024,
            max_frame_size: 10 * 1024 * 1024,
            read_chunk_size: 65535,
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the send buffer capacity.
    #[must_use]
    pub const fn with_max_send_buffer_size(mut self, size: usize) -> Self {
        self.max_send_buffer_size = size;
        self
    }

    /// Set the maximum inbound frame size.
    #[must_use]
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the per-read chunk bound.
    #[must_use]
    pub const fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    /// Validate an announced frame length against the configured maximum.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: usize) -> Result<(), Error> {
        if size > self.max_frame_size {
            Err(Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }
}
