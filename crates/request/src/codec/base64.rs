use ::base64::Engine;
use ::base64::alphabet;
use ::base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use tracing::debug;

use crate::ByteBuffer;

/// Standard alphabet and padded output. Input padding is optional and unused
/// trailing bits are ignored.
const ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Encodes `data` with the standard alphabet, padded with `=` to a multiple of four.
pub fn base64_encode(data: &[u8]) -> String {
    ENGINE.encode(data)
}

/// Decodes standard base64 text.
///
/// Returns an empty buffer if `input` holds any character outside the alphabet,
/// whitespace included, or is otherwise malformed.
pub fn base64_decode(input: &str) -> ByteBuffer {
    match ENGINE.decode(input) {
        Ok(decoded) => ByteBuffer::from(decoded),
        Err(e) => {
            debug!(cause = %e, len = input.len(), "rejecting malformed base64 input");
            ByteBuffer::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode() {
        assert_eq!(base64_encode(b""), "");
        assert_eq!(base64_encode(b"f"), "Zg==");
        assert_eq!(base64_encode(b"fo"), "Zm8=");
        assert_eq!(base64_encode(b"foo"), "Zm9v");
        assert_eq!(base64_encode(b"hello world"), "aGVsbG8gd29ybGQ=");
        assert_eq!(base64_encode(&[0xFB, 0xFF]), "+/8=");
    }

    #[test]
    fn decode() {
        assert_eq!(base64_decode("aGVsbG8gd29ybGQ=").as_bytes(), b"hello world");
        assert_eq!(base64_decode("Zm8").as_bytes(), b"fo");
        assert_eq!(base64_decode("+/8=").as_bytes(), &[0xFB, 0xFF]);
        assert!(base64_decode("").is_empty());
    }

    #[test]
    fn decode_ignores_trailing_bits() {
        assert_eq!(base64_decode("Zh==").as_bytes(), b"f");
        assert_eq!(base64_decode("Zm9=").as_bytes(), b"fo");
        assert_eq!(base64_decode("Zh").as_bytes(), b"f");
    }

    #[test]
    fn decode_illegal_is_empty() {
        assert!(base64_decode("ab$d").is_empty());
        assert!(base64_decode("aGVs bG8=").is_empty());
        assert!(base64_decode("-_8=").is_empty());
    }

    #[test]
    fn decode_restores_binary() {
        let data: Vec<u8> = (0..=255).collect();
        for len in [0, 1, 2, 3, 4, 5, 64, 255, 256] {
            assert_eq!(base64_decode(&base64_encode(&data[..len])).as_bytes(), &data[..len]);
        }
    }
}
