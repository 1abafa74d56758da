//! Newline-delimited text framing.

use bytes::{Bytes, BytesMut};

use crate::codec::{FrameLength, ProtocolCodec};
use crate::connection::ConnectionInfo;
use crate::error::Result;

/// Text framing delimited by `\n`.
///
/// A frame is everything up to and including the next newline. Decoding
/// strips the trailing `\n` (and a preceding `\r`, for telnet-style peers);
/// encoding appends `\n`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineCodec;

impl LineCodec {
    /// Create the codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolCodec for LineCodec {
    fn frame_length(&self, buffer: &[u8], _conn: &ConnectionInfo) -> Result<FrameLength> {
        match buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => Ok(FrameLength::Complete(pos + 1)),
            None => Ok(FrameLength::Pending),
        }
    }

    fn decode(&self, frame: Bytes, _conn: &ConnectionInfo) -> Result<Bytes> {
        let mut end = frame.len();
        if end > 0 && frame[end - 1] == b'\n' {
            end -= 1;
        }
        if end > 0 && frame[end - 1] == b'\r' {
            end -= 1;
        }
        Ok(frame.slice(..end))
    }

    fn encode(&self, message: &[u8], _conn: &ConnectionInfo) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(message.len() + 1);
        out.extend_from_slice(message);
        out.extend_from_slice(b"\n");
        Ok(out.freeze())
    }
}
