//! Protocol codec contract.
//!
//! A codec turns a raw byte stream into framed application messages and
//! back. The engine owns the buffering and drives the codec through three
//! calls: boundary detection ([`ProtocolCodec::frame_length`]), inbound
//! decoding ([`ProtocolCodec::decode`]), and outbound encoding
//! ([`ProtocolCodec::encode`]). Codecs are shared read-only across the
//! connections that use them; per-connection context arrives through
//! [`ConnectionInfo`](crate::connection::ConnectionInfo).
//!
//! Two codecs ship with the crate:
//!
//! - [`LengthPrefixCodec`] - a u32 big-endian total-length header
//! - [`LineCodec`] - newline-delimited text records

mod length_prefix;
mod line;

pub use length_prefix::LengthPrefixCodec;
pub use line::LineCodec;

use bytes::Bytes;

use crate::connection::ConnectionInfo;
use crate::error::Result;

/// Outcome of a frame-boundary probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLength {
    /// Not enough buffered data to determine the next boundary; the engine
    /// waits for more bytes.
    Pending,
    /// The next frame spans exactly this many bytes from the front of the
    /// buffer, header included. Must be non-zero.
    Complete(usize),
}

/// Capability interface a protocol implementation satisfies.
///
/// Implementations must be deterministic with respect to the buffer
/// contents: probing a longer buffer that starts with the same bytes must
/// yield the same boundary. The engine relies on this to make chunking
/// transparent.
pub trait ProtocolCodec {
    /// Determine the length of the next frame from the front of `buffer`.
    ///
    /// Return [`FrameLength::Pending`] when the boundary cannot be
    /// determined yet, and [`FrameLength::Complete`] once it can. The
    /// announced length is a commitment: the engine buffers until exactly
    /// that many bytes are available, then extracts them as one frame.
    ///
    /// # Errors
    ///
    /// Return an error for malformed input that can never frame; the engine
    /// destroys the connection.
    fn frame_length(&self, buffer: &[u8], conn: &ConnectionInfo) -> Result<FrameLength>;

    /// Decode one extracted frame into an application message.
    ///
    /// # Errors
    ///
    /// A decode failure is escalated by the engine as a fatal fault, on the
    /// same footing as a handler fault: the frame was already accepted as
    /// well-formed by [`frame_length`](Self::frame_length), so failing here
    /// means the codec itself is broken.
    fn decode(&self, frame: Bytes, conn: &ConnectionInfo) -> Result<Bytes>;

    /// Encode an outbound message into wire bytes.
    ///
    /// Returning an empty buffer means "nothing to transmit" and is not an
    /// error; the engine reports the send as skipped.
    ///
    /// # Errors
    ///
    /// An encode failure destroys the connection.
    fn encode(&self, message: &[u8], conn: &ConnectionInfo) -> Result<Bytes>;
}
