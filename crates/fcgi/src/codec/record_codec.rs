//! Record framing for FastCGI connections.
//!
//! Every FastCGI record starts with an eight byte header:
//!
//! ```text
//! version | type | requestId (u16) | contentLength (u16) | paddingLength | reserved
//! ```
//!
//! followed by `contentLength` bytes of content and `paddingLength` bytes of padding.
//! [`RecordCodec`] implements both [`Decoder`] and [`Encoder`] so it can drive any
//! byte stream; the blocking transport in this crate feeds it from a socket by hand.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::ensure;
use crate::protocol::{FCGI_VERSION_1, HEADER_LEN, MAX_CONTENT_LEN, ProtocolError, Record, RecordType};

/// Records are padded so that every header starts on an eight byte boundary
const ALIGNMENT: usize = 8;

#[derive(Debug, Default, Clone, Copy)]
pub struct RecordCodec;

impl RecordCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for RecordCodec {
    type Item = Record;
    type Error = ProtocolError;

    /// Decodes one record from `src`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))` once header, content and padding are all buffered
    /// - `Ok(None)` if more data is needed
    /// - `Err(ProtocolError::InvalidVersion)` when the peer does not speak FastCGI 1
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let version = src[0];
        ensure!(version == FCGI_VERSION_1, ProtocolError::InvalidVersion(version));

        let record_type = RecordType::from(src[1]);
        let request_id = u16::from_be_bytes([src[2], src[3]]);
        let content_len = usize::from(u16::from_be_bytes([src[4], src[5]]));
        let padding_len = usize::from(src[6]);

        let total = HEADER_LEN + content_len + padding_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let content = src.split_to(content_len).freeze();
        src.advance(padding_len);

        trace!(?record_type, request_id, content_len, "decoded record");
        Ok(Some(Record { record_type, request_id, content }))
    }
}

impl Encoder<Record> for RecordCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Record, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let content_len = item.content.len();
        ensure!(
            content_len <= MAX_CONTENT_LEN,
            ProtocolError::io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("record content of {content_len} bytes exceeds {MAX_CONTENT_LEN}"),
            ))
        );

        let padding_len = (ALIGNMENT - content_len % ALIGNMENT) % ALIGNMENT;
        dst.reserve(HEADER_LEN + content_len + padding_len);

        dst.put_u8(FCGI_VERSION_1);
        dst.put_u8(item.record_type.as_u8());
        dst.put_u16(item.request_id);
        // both bounded by the checks above
        dst.put_u16(u16::try_from(content_len).unwrap_or(u16::MAX));
        dst.put_u8(u8::try_from(padding_len).unwrap_or(0));
        dst.put_u8(0);
        dst.put_slice(&item.content);
        dst.put_bytes(0, padding_len);
        Ok(())
    }
}

/// Encodes `data` as a sequence of stream records of `record_type`, splitting at the
/// maximum content length. An empty `data` produces nothing; use
/// [`Record::end_of_stream`] to close a stream.
///
/// # Errors
///
/// Propagates encoder failures, which cannot happen for chunks within the limit.
pub fn encode_stream(record_type: RecordType, request_id: u16, data: &[u8], dst: &mut BytesMut) -> Result<(), ProtocolError> {
    let mut codec = RecordCodec;
    for chunk in data.chunks(MAX_CONTENT_LEN) {
        codec.encode(Record::new(record_type, request_id, bytes::Bytes::copy_from_slice(chunk)), dst)?;
    }
    Ok(())
}
