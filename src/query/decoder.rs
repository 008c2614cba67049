//! Percent-decoding of a single query token.
//!
//! `+` becomes a space, `%XX` escapes become raw bytes, and every run of
//! escaped bytes is decoded with the decoder's character encoding. Literal
//! characters are copied through untouched.

use encoding_rs::{Encoding, UTF_8};

/// Query token decoding errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodingError {
    /// `%` was followed by fewer than two characters
    IncompleteEscape { position: usize },
    /// `%` was followed by characters that are not hex digits
    InvalidHexDigit { position: usize },
    /// Escaped bytes are not valid in the configured encoding
    MalformedSequence { encoding: &'static str },
    /// The encoding label is not known
    UnsupportedEncoding(String),
}

impl std::fmt::Display for DecodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodingError::IncompleteEscape { position } => {
                write!(f, "Incomplete escape sequence at offset {}", position)
            }
            DecodingError::InvalidHexDigit { position } => {
                write!(f, "Invalid hex digit in escape sequence at offset {}", position)
            }
            DecodingError::MalformedSequence { encoding } => {
                write!(f, "Escaped bytes are not valid {}", encoding)
            }
            DecodingError::UnsupportedEncoding(label) => {
                write!(f, "Unsupported character encoding: {}", label)
            }
        }
    }
}

impl std::error::Error for DecodingError {}

/// Decodes percent-encoded query tokens with a fixed character encoding.
#[derive(Debug, Clone, Copy)]
pub struct QueryDecoder {
    encoding: &'static Encoding,
}

impl Default for QueryDecoder {
    fn default() -> Self {
        Self::new(UTF_8)
    }
}

impl QueryDecoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        QueryDecoder { encoding }
    }

    /// Build a decoder from a WHATWG encoding label such as `utf-8` or
    /// `iso-8859-1`.
    pub fn for_label(label: &str) -> Result<Self, DecodingError> {
        Encoding::for_label(label.trim().as_bytes())
            .map(Self::new)
            .ok_or_else(|| DecodingError::UnsupportedEncoding(label.to_string()))
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Decode one key or value token.
    pub fn decode(&self, token: &str) -> Result<String, DecodingError> {
        let bytes = token.as_bytes();
        let mut decoded = String::with_capacity(token.len());
        let mut escaped: Vec<u8> = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'%' => {
                    if i + 2 >= bytes.len() {
                        return Err(DecodingError::IncompleteEscape { position: i });
                    }
                    let high = hex_value(bytes[i + 1]);
                    let low = hex_value(bytes[i + 2]);
                    match (high, low) {
                        (Some(high), Some(low)) => escaped.push((high << 4) | low),
                        _ => return Err(DecodingError::InvalidHexDigit { position: i }),
                    }
                    i += 3;
                }
                b'+' => {
                    self.flush(&mut escaped, &mut decoded)?;
                    decoded.push(' ');
                    i += 1;
                }
                _ => {
                    self.flush(&mut escaped, &mut decoded)?;
                    // '%' and '+' are ASCII, so the run ends on a char boundary
                    let end = bytes[i..]
                        .iter()
                        .position(|&b| b == b'%' || b == b'+')
                        .map_or(bytes.len(), |n| i + n);
                    decoded.push_str(&token[i..end]);
                    i = end;
                }
            }
        }

        self.flush(&mut escaped, &mut decoded)?;
        Ok(decoded)
    }

    /// Decode pending escaped bytes into `out`.
    fn flush(&self, escaped: &mut Vec<u8>, out: &mut String) -> Result<(), DecodingError> {
        if escaped.is_empty() {
            return Ok(());
        }
        let text = self
            .encoding
            .decode_without_bom_handling_and_without_replacement(&escaped[..])
            .ok_or(DecodingError::MalformedSequence {
                encoding: self.encoding.name(),
            })?;
        out.push_str(&text);
        escaped.clear();
        Ok(())
    }
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_token_unchanged() {
        let decoder = QueryDecoder::default();
        assert_eq!(decoder.decode("hello").unwrap(), "hello");
        assert_eq!(decoder.decode("").unwrap(), "");
    }

    #[test]
    fn test_space_forms() {
        let decoder = QueryDecoder::default();
        assert_eq!(decoder.decode("a%20b").unwrap(), "a b");
        assert_eq!(decoder.decode("a+b").unwrap(), "a b");
    }

    #[test]
    fn test_reserved_characters() {
        let decoder = QueryDecoder::default();
        assert_eq!(decoder.decode("a%26b%3Dc").unwrap(), "a&b=c");
        assert_eq!(decoder.decode("100%25").unwrap(), "100%");
        assert_eq!(decoder.decode("%2B").unwrap(), "+");
    }

    #[test]
    fn test_multibyte_utf8() {
        let decoder = QueryDecoder::default();
        assert_eq!(decoder.decode("caf%C3%A9").unwrap(), "café");
        assert_eq!(decoder.decode("%e2%82%ac+5").unwrap(), "€ 5");
    }

    #[test]
    fn test_literal_non_ascii_passes_through() {
        let decoder = QueryDecoder::default();
        assert_eq!(decoder.decode("grüße+%21").unwrap(), "grüße !");
    }

    #[test]
    fn test_invalid_hex_digit() {
        let decoder = QueryDecoder::default();
        assert_eq!(
            decoder.decode("%zz"),
            Err(DecodingError::InvalidHexDigit { position: 0 })
        );
        assert_eq!(
            decoder.decode("ab%4g"),
            Err(DecodingError::InvalidHexDigit { position: 2 })
        );
    }

    #[test]
    fn test_incomplete_escape() {
        let decoder = QueryDecoder::default();
        assert_eq!(
            decoder.decode("abc%"),
            Err(DecodingError::IncompleteEscape { position: 3 })
        );
        assert_eq!(
            decoder.decode("%4"),
            Err(DecodingError::IncompleteEscape { position: 0 })
        );
    }

    #[test]
    fn test_malformed_utf8_sequence() {
        let decoder = QueryDecoder::default();
        assert_eq!(
            decoder.decode("%C3"),
            Err(DecodingError::MalformedSequence { encoding: "UTF-8" })
        );
        // A split multi-byte sequence is not rejoined across a literal
        assert!(decoder.decode("%C3x%A9").is_err());
    }

    #[test]
    fn test_latin1_encoding() {
        let decoder = QueryDecoder::for_label("iso-8859-1").unwrap();
        assert_eq!(decoder.decode("caf%E9").unwrap(), "café");
    }

    #[test]
    fn test_unsupported_label() {
        assert_eq!(
            QueryDecoder::for_label("klingon").unwrap_err(),
            DecodingError::UnsupportedEncoding("klingon".to_string())
        );
    }
}
