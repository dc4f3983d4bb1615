//! Binary-safe byte container used for request bodies, multipart payloads and
//! response bodies.

use std::ffi::CStr;
use std::fmt;
use std::ops::Deref;

use bytes::{BufMut, Bytes, BytesMut};

/// Returned by [`ByteBuffer::at`] for an index past the end
pub const OUT_OF_RANGE: u8 = 0xFF;

/// An owned, growable sequence of bytes.
///
/// Unlike a `String` it never assumes its content is text. Appends report success
/// by comparing the size before and after, and indexed reads past the end return
/// [`OUT_OF_RANGE`] instead of panicking.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteBuffer {
    data: BytesMut,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: BytesMut::with_capacity(capacity) }
    }

    /// Copies `src` into a new buffer
    pub fn from_slice(src: &[u8]) -> Self {
        Self { data: BytesMut::from(src) }
    }

    pub fn append_str(&mut self, s: &str) -> bool {
        self.append_slice(s.as_bytes())
    }

    /// Appends the bytes of `s` up to, not including, its terminating nul
    pub fn append_c_str(&mut self, s: &CStr) -> bool {
        self.append_slice(s.to_bytes())
    }

    pub fn append_byte(&mut self, byte: u8) -> bool {
        let before = self.data.len();
        self.data.put_u8(byte);
        self.data.len() == before + 1
    }

    pub fn append_slice(&mut self, src: &[u8]) -> bool {
        let before = self.data.len();
        self.data.extend_from_slice(src);
        self.data.len() == before + src.len()
    }

    /// Grows or shrinks the buffer to exactly `len` bytes. New bytes are zero.
    pub fn resize_to(&mut self, len: usize) -> bool {
        self.data.resize(len, 0);
        self.data.len() == len
    }

    /// The byte at `index`, or [`OUT_OF_RANGE`] if there is none
    pub fn at(&self, index: usize) -> u8 {
        self.data.get(index).copied().unwrap_or(OUT_OF_RANGE)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// The content as text, with invalid UTF-8 replaced by `U+FFFD`
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }
}

impl Deref for ByteBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl From<&str> for ByteBuffer {
    fn from(s: &str) -> Self {
        Self::from_slice(s.as_bytes())
    }
}

impl From<String> for ByteBuffer {
    fn from(s: String) -> Self {
        Self::from(s.into_bytes())
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(src: &[u8]) -> Self {
        Self::from_slice(src)
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(src: Vec<u8>) -> Self {
        Self { data: BytesMut::from(Bytes::from(src)) }
    }
}

impl From<Bytes> for ByteBuffer {
    fn from(src: Bytes) -> Self {
        Self { data: BytesMut::from(src) }
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteBuffer({} bytes, {:?})", self.data.len(), self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construct() {
        assert!(ByteBuffer::new().is_empty());
        assert_eq!(ByteBuffer::from("abc").len(), 3);

        let binary = ByteBuffer::from_slice(&[0, 1, 0, 2]);
        assert_eq!(binary.len(), 4);
        assert_eq!(binary.to_vec(), vec![0, 1, 0, 2]);
    }

    #[test]
    fn append_reports_size_delta() {
        let mut buffer = ByteBuffer::new();
        assert!(buffer.append_str("ab"));
        assert!(buffer.append_c_str(c"cd"));
        assert!(buffer.append_byte(b'e'));
        assert!(buffer.append_slice(&[0xFF, 0x00]));
        assert_eq!(buffer.as_bytes(), b"abcde\xFF\x00");
        assert_eq!(buffer.len(), 7);
    }

    #[test]
    fn resize() {
        let mut buffer = ByteBuffer::from("hello");
        assert!(buffer.resize_to(8));
        assert_eq!(buffer.len(), 8);
        assert!(buffer.resize_to(2));
        assert_eq!(buffer.as_bytes(), b"he");
        assert!(buffer.resize_to(0));
        assert!(buffer.is_empty());
    }

    #[test]
    fn at_returns_sentinel_past_the_end() {
        let buffer = ByteBuffer::from("xy");
        assert_eq!(buffer.at(0), b'x');
        assert_eq!(buffer.at(1), b'y');
        assert_eq!(buffer.at(2), OUT_OF_RANGE);
        assert_eq!(buffer.at(usize::MAX), OUT_OF_RANGE);
        assert_eq!(ByteBuffer::new().at(0), 0xFF);
    }

    #[test]
    fn lossy_text() {
        let buffer = ByteBuffer::from_slice(b"ok\xFF");
        assert_eq!(buffer.to_string_lossy(), "ok\u{FFFD}");
    }
}
