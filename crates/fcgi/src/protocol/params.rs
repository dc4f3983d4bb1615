//! Name-value pair encoding used by PARAMS, GET_VALUES and GET_VALUES_RESULT records.
//!
//! Each length is written in one byte when it is below 128, otherwise in four
//! bytes with the high bit of the first byte set (FastCGI 1.0, section 3.4).

use bytes::{BufMut, BytesMut};

use crate::ensure;
use crate::protocol::ProtocolError;

const LONG_LENGTH_FLAG: u8 = 0x80;

/// Appends one encoded name-value pair to `dst`.
pub fn encode_pair(name: &[u8], value: &[u8], dst: &mut BytesMut) {
    dst.reserve(name.len() + value.len() + 8);
    put_length(name.len(), dst);
    put_length(value.len(), dst);
    dst.put_slice(name);
    dst.put_slice(value);
}

fn put_length(len: usize, dst: &mut BytesMut) {
    match u8::try_from(len) {
        Ok(short) if short < LONG_LENGTH_FLAG => dst.put_u8(short),
        _ => {
            let len = u32::try_from(len).unwrap_or(u32::MAX >> 1) | 0x8000_0000;
            dst.put_u32(len);
        }
    }
}

fn read_length(src: &[u8], offset: &mut usize) -> Result<usize, ProtocolError> {
    let first = *src.get(*offset).ok_or_else(|| ProtocolError::malformed_params("truncated length"))?;
    if first & LONG_LENGTH_FLAG == 0 {
        *offset += 1;
        return Ok(usize::from(first));
    }

    ensure!(src.len() >= *offset + 4, ProtocolError::malformed_params("truncated long length"));
    let bytes = [first & !LONG_LENGTH_FLAG, src[*offset + 1], src[*offset + 2], src[*offset + 3]];
    *offset += 4;
    Ok(u32::from_be_bytes(bytes) as usize)
}

/// Decodes every name-value pair contained in `src`.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedParams`] when a length runs past the end of `src`.
pub fn decode_pairs(src: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ProtocolError> {
    let mut pairs = Vec::new();
    let mut offset = 0;

    while offset < src.len() {
        let name_len = read_length(src, &mut offset)?;
        let value_len = read_length(src, &mut offset)?;

        let name_end = offset.checked_add(name_len).ok_or_else(|| ProtocolError::malformed_params("name length overflow"))?;
        let value_end =
            name_end.checked_add(value_len).ok_or_else(|| ProtocolError::malformed_params("value length overflow"))?;
        ensure!(value_end <= src.len(), ProtocolError::malformed_params("pair runs past the end of the stream"));

        pairs.push((src[offset..name_end].to_vec(), src[name_end..value_end].to_vec()));
        offset = value_end;
    }

    Ok(pairs)
}

/// Turns decoded pairs into CGI style `KEY=VALUE` environment entries.
pub fn into_environment(pairs: Vec<(Vec<u8>, Vec<u8>)>) -> Vec<String> {
    pairs
        .into_iter()
        .map(|(name, value)| {
            let mut entry = String::from_utf8_lossy(&name).into_owned();
            entry.push('=');
            entry.push_str(&String::from_utf8_lossy(&value));
            entry
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_long_lengths() {
        let long_value = vec![b'x'; 300];
        let mut buf = BytesMut::new();
        encode_pair(b"SCRIPT_NAME", b"/index", &mut buf);
        encode_pair(b"HTTP_COOKIE", &long_value, &mut buf);

        // 1 + 1 + 11 + 6 for the first pair, 1 + 4 + 11 + 300 for the second
        assert_eq!(buf.len(), 19 + 316);

        let pairs = decode_pairs(&buf).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], (b"SCRIPT_NAME".to_vec(), b"/index".to_vec()));
        assert_eq!(pairs[1].1.len(), 300);
    }

    #[test]
    fn truncated_pair() {
        let mut buf = BytesMut::new();
        encode_pair(b"QUERY_STRING", b"a=1", &mut buf);
        buf.truncate(buf.len() - 1);

        assert!(matches!(decode_pairs(&buf), Err(ProtocolError::MalformedParams { .. })));
    }

    #[test]
    fn environment_entries() {
        let env = into_environment(vec![(b"REQUEST_METHOD".to_vec(), b"GET".to_vec()), (b"EMPTY".to_vec(), Vec::new())]);
        assert_eq!(env, vec!["REQUEST_METHOD=GET".to_string(), "EMPTY=".to_string()]);
    }
}
