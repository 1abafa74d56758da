//! Grow-only byte accumulator with consume-from-front semantics.
//!
//! Both the receive and send sides of a connection use the same buffer
//! shape: bytes are appended at the back as they arrive (or are queued), and
//! removed from the front as frames are extracted or the socket accepts
//! writes.

use bytes::{Bytes, BytesMut};

/// Byte accumulator backing a connection's receive and send queues.
///
/// Extraction hands out owned [`Bytes`]; callers never hold a live view into
/// the accumulator while it continues to grow.
#[derive(Debug, Default)]
pub struct ByteBuffer {
    inner: BytesMut,
}

impl ByteBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: BytesMut::new(),
        }
    }

    /// Create an empty buffer with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of buffered bytes.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check whether the buffer holds no bytes.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// View the buffered bytes.
    #[must_use]
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Append bytes at the back.
    pub fn push(&mut self, data: &[u8]) {
        self.inner.extend_from_slice(data);
    }

    /// Extract exactly `len` bytes from the front.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the buffered length; callers check
    /// availability first.
    pub fn split_to(&mut self, len: usize) -> Bytes {
        self.inner.split_to(len).freeze()
    }

    /// Extract all buffered bytes, leaving the buffer empty.
    pub fn take_all(&mut self) -> Bytes {
        self.inner.split().freeze()
    }

    /// Discard up to `len` bytes from the front.
    pub fn consume(&mut self, len: usize) {
        let n = len.min(self.inner.len());
        bytes::Buf::advance(&mut self.inner, n);
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_len() {
        let mut buf = ByteBuffer::new();
        assert!(buf.is_empty());
        buf.push(b"hello");
        buf.push(b" world");
        assert_eq!(buf.len(), 11);
        assert_eq!(buf.as_slice(), b"hello world");
    }

    #[test]
    fn test_split_to_removes_front() {
        let mut buf = ByteBuffer::new();
        buf.push(b"abcdef");
        let front = buf.split_to(4);
        assert_eq!(&front[..], b"abcd");
        assert_eq!(buf.as_slice(), b"ef");
    }

    #[test]
    fn test_take_all_empties() {
        let mut buf = ByteBuffer::new();
        buf.push(b"payload");
        let all = buf.take_all();
        assert_eq!(&all[..], b"payload");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_consume_clamps() {
        let mut buf = ByteBuffer::new();
        buf.push(b"abc");
        buf.consume(2);
        assert_eq!(buf.as_slice(), b"c");
        buf.consume(100);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_growth_after_extraction() {
        let mut buf = ByteBuffer::with_capacity(8);
        buf.push(b"12345678");
        let _ = buf.split_to(8);
        buf.push(b"more data after reuse");
        assert_eq!(buf.as_slice(), b"more data after reuse");
    }
}
