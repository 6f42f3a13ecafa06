//! URI-style percent encoding for the compact fallback grammar.
//!
//! Mirrors the character classes of `encodeURI`: unreserved and reserved
//! URI characters pass through, everything else is written as `%XX` escapes
//! of its UTF-8 bytes. The compact grammar's delimiters (`= : & @ _ ; /`)
//! are all in the pass-through set, so encoding never disturbs structure.

use crate::error::{CodecError, CodecResult};

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Returns `true` for bytes `encodeURI` leaves untouched.
fn is_passthrough(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b';' | b','
                | b'/'
                | b'?'
                | b':'
                | b'@'
                | b'&'
                | b'='
                | b'+'
                | b'$'
                | b'-'
                | b'_'
                | b'.'
                | b'!'
                | b'~'
                | b'*'
                | b'\''
                | b'('
                | b')'
                | b'#'
        )
}

/// Percent-encodes every byte outside the URI pass-through set.
#[must_use]
pub fn encode_uri(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for &byte in input.as_bytes() {
        if is_passthrough(byte) {
            out.push(char::from(byte));
        } else {
            out.push('%');
            out.push(char::from(HEX[usize::from(byte >> 4)]));
            out.push(char::from(HEX[usize::from(byte & 0x0f)]));
        }
    }
    out
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Reverses [`encode_uri`].
///
/// # Errors
///
/// Returns [`CodecError::InvalidPercentEncoding`] for a malformed escape and
/// [`CodecError::InvalidUtf8`] if the decoded bytes are not UTF-8.
pub fn decode_uri(input: &str) -> CodecResult<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut pos = 0;
    while pos < bytes.len() {
        if bytes[pos] == b'%' {
            let hi = bytes.get(pos + 1).copied().and_then(hex_value);
            let lo = bytes.get(pos + 2).copied().and_then(hex_value);
            match (hi, lo) {
                (Some(hi), Some(lo)) => out.push((hi << 4) | lo),
                _ => return Err(CodecError::InvalidPercentEncoding { pos }),
            }
            pos += 3;
        } else {
            out.push(bytes[pos]);
            pos += 1;
        }
    }
    String::from_utf8(out).map_err(|_| CodecError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grammar_delimiters_pass_through() {
        assert_eq!(encode_uri("=:&@_;/"), "=:&@_;/");
    }

    #[test]
    fn spaces_and_percent_are_escaped() {
        assert_eq!(encode_uri("a b%"), "a%20b%25");
        assert_eq!(decode_uri("a%20b%25").unwrap(), "a b%");
    }

    #[test]
    fn multibyte_characters_use_utf8_escapes() {
        let encoded = encode_uri("é€");
        assert_eq!(encoded, "%C3%A9%E2%82%AC");
        assert_eq!(decode_uri(&encoded).unwrap(), "é€");
    }

    #[test]
    fn lowercase_hex_is_accepted() {
        assert_eq!(decode_uri("%c3%a9").unwrap(), "é");
    }

    #[test]
    fn truncated_escape_is_rejected() {
        assert!(matches!(
            decode_uri("abc%4"),
            Err(CodecError::InvalidPercentEncoding { pos: 3 })
        ));
        assert!(matches!(
            decode_uri("%zz"),
            Err(CodecError::InvalidPercentEncoding { pos: 0 })
        ));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        assert!(matches!(decode_uri("%FF"), Err(CodecError::InvalidUtf8)));
    }
}
