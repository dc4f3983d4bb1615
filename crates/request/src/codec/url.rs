/// Characters that are percent-encoded, `%` included so that decoding restores the input
const RESERVED: &[u8] = b":/?#[]@!$&'()*+,;=%";

/// Percent-encodes the reserved characters of `s` as lowercase `%hh` and turns spaces into `+`.
///
/// Every other character, including non-ASCII text, is copied unchanged.
pub fn url_encode(s: &str) -> String {
    let mut encoded = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            ' ' => encoded.push('+'),
            c if c.is_ascii() && RESERVED.contains(&(c as u8)) => encoded.push_str(&format!("%{:02x}", c as u8)),
            c => encoded.push(c),
        }
    }
    encoded
}

/// Decodes `+` as a space and `%hh` (either case) as the byte `hh`.
///
/// A `%` that is not followed by two hex digits is kept literally. Decoded bytes
/// that are not valid UTF-8 are replaced with `U+FFFD`.
pub fn url_decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_reserved() {
        assert_eq!(url_encode("a b&c=d"), "a+b%26c%3dd");
        assert_eq!(url_encode(":/?#[]@"), "%3a%2f%3f%23%5b%5d%40");
        assert_eq!(url_encode("!$&'()*+,;="), "%21%24%26%27%28%29%2a%2b%2c%3b%3d");
        assert_eq!(url_encode("100%"), "100%25");
        assert_eq!(url_encode("plain-text_~."), "plain-text_~.");
        assert_eq!(url_encode("héllo wörld"), "héllo+wörld");
        assert_eq!(url_encode(""), "");
    }

    #[test]
    fn decode() {
        assert_eq!(url_decode("a+b%26c%3Dd"), "a b&c=d");
        assert_eq!(url_decode("%e4%bd%a0%E5%A5%BD"), "你好");
        assert_eq!(url_decode("no-escapes"), "no-escapes");
        assert_eq!(url_decode(""), "");
    }

    #[test]
    fn decode_malformed_escapes_literally() {
        assert_eq!(url_decode("100%"), "100%");
        assert_eq!(url_decode("%4"), "%4");
        assert_eq!(url_decode("%zz1"), "%zz1");
        assert_eq!(url_decode("%%41"), "%A");
    }

    #[test]
    fn decode_invalid_utf8_lossy() {
        assert_eq!(url_decode("%ff"), "\u{FFFD}");
    }

    #[test]
    fn decode_restores_encoded() {
        for s in ["", "a b", "k=v&x=%20", "C:\\path\\file name.txt", "[::1]:80/?q#frag", "ünïcödé + more"] {
            assert_eq!(url_decode(&url_encode(s)), s, "input {s:?}");
        }
    }
}
