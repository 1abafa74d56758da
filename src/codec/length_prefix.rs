//! Length-prefixed binary framing.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{FrameLength, ProtocolCodec};
use crate::connection::ConnectionInfo;
use crate::error::{Error, Result};

/// Size of the length header in bytes.
const HEADER_LEN: usize = 4;

/// Binary framing with a u32 big-endian total-length header.
///
/// The header value counts the whole frame, header included, so the
/// smallest legal value is 4 (an empty payload). Decoding strips the
/// header; encoding prepends it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthPrefixCodec;

impl LengthPrefixCodec {
    /// Create the codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolCodec for LengthPrefixCodec {
    fn frame_length(&self, buffer: &[u8], _conn: &ConnectionInfo) -> Result<FrameLength> {
        if buffer.len() < HEADER_LEN {
            return Ok(FrameLength::Pending);
        }
        let total = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        if total < HEADER_LEN {
            return Err(Error::MalformedFrame(format!(
                "length header {total} smaller than the header itself"
            )));
        }
        Ok(FrameLength::Complete(total))
    }

    fn decode(&self, frame: Bytes, _conn: &ConnectionInfo) -> Result<Bytes> {
        if frame.len() < HEADER_LEN {
            return Err(Error::Codec(format!(
                "frame of {} bytes is shorter than the length header",
                frame.len()
            )));
        }
        Ok(frame.slice(HEADER_LEN..))
    }

    fn encode(&self, message: &[u8], _conn: &ConnectionInfo) -> Result<Bytes> {
        let total = message
            .len()
            .checked_add(HEADER_LEN)
            .filter(|&t| t <= u32::MAX as usize)
            .ok_or(Error::FrameTooLarge {
                size: message.len(),
                max: u32::MAX as usize - HEADER_LEN,
            })?;
        let mut out = BytesMut::with_capacity(total);
        out.put_u32(total as u32);
        out.extend_from_slice(message);
        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ConnectionInfo {
        ConnectionInfo {
            id: 1,
            remote_addr: None,
            local_addr: None,
        }
    }

    #[test]
    fn test_frame_length_pending_below_header() {
        let codec = LengthPrefixCodec::new();
        assert_eq!(
            codec.frame_length(&[0, 0, 7], &info()).unwrap(),
            FrameLength::Pending
        );
    }

    #[test]
    fn test_frame_length_reads_header() {
        let codec = LengthPrefixCodec::new();
        let buf = [0, 0, 0, 9, b'h', b'i'];
        assert_eq!(
            codec.frame_length(&buf, &info()).unwrap(),
            FrameLength::Complete(9)
        );
    }

    #[test]
    fn test_frame_length_rejects_undersized_header() {
        let codec = LengthPrefixCodec::new();
        let buf = [0, 0, 0, 3, 0xff];
        assert!(matches!(
            codec.frame_length(&buf, &info()),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_encode_prefixes_total_length() {
        let codec = LengthPrefixCodec::new();
        let wire = codec.encode(b"abc", &info()).unwrap();
        assert_eq!(&wire[..], &[0, 0, 0, 7, b'a', b'b', b'c']);
    }

    #[test]
    fn test_decode_strips_header() {
        let codec = LengthPrefixCodec::new();
        let wire = codec.encode(b"payload", &info()).unwrap();
        let message = codec.decode(wire, &info()).unwrap();
        assert_eq!(&message[..], b"payload");
    }

    #[test]
    fn test_empty_payload_frames_as_header_only() {
        let codec = LengthPrefixCodec::new();
        let wire = codec.encode(b"", &info()).unwrap();
        assert_eq!(&wire[..], &[0, 0, 0, 4]);
        assert_eq!(
            codec.frame_length(&wire, &info()).unwrap(),
            FrameLength::Complete(4)
        );
        let message = codec.decode(wire, &info()).unwrap();
        assert!(message.is_empty());
    }
}
