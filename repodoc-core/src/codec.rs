//! Text <-> blob transcoding.
//!
//! Blob stores carry file content as base64. Encoding works on the UTF-8
//! bytes of the text, so multi-byte characters survive a round trip without
//! any percent-escaping step.

use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;

/// Errors that can occur while decoding a blob.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid base64 content: {0}")]
    InvalidBase64(String),

    #[error("Blob content is not valid UTF-8: {0}")]
    InvalidUtf8(String),
}

/// Encodes text as a base64 blob.
pub fn encode(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Decodes a base64 blob back into text.
///
/// ASCII whitespace is ignored, since stores often wrap base64 output
/// at a fixed line width.
pub fn decode(blob: &str) -> Result<String, CodecError> {
    let compact: String = blob
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| CodecError::InvalidBase64(e.to_string()))?;

    String::from_utf8(bytes).map_err(|e| CodecError::InvalidUtf8(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_ascii() {
        let text = r#"{"id":"p1","values":{"name":"Somchai"}}"#;
        assert_eq!(decode(&encode(text)).unwrap(), text);
    }

    #[test]
    fn test_roundtrip_multibyte() {
        for text in [
            "สมชาย ใจดี",
            "emoji 🩺💉 and more 👩‍⚕️",
            "日本語テキスト",
            "mixed: naïve café — ok",
        ] {
            assert_eq!(decode(&encode(text)).unwrap(), text);
        }
    }

    #[test]
    fn test_roundtrip_control_characters() {
        let text = "line1\nline2\r\n\ttab\u{0}nul\u{1b}[0m\u{7f}";
        assert_eq!(decode(&encode(text)).unwrap(), text);
    }

    #[test]
    fn test_roundtrip_empty() {
        assert_eq!(encode(""), "");
        assert_eq!(decode("").unwrap(), "");
    }

    #[test]
    fn test_decode_ignores_line_wrapping() {
        let text = "a somewhat longer payload that produces more than one line of base64";
        let encoded = encode(text);
        let wrapped: String = encoded
            .as_bytes()
            .chunks(20)
            .map(|chunk| std::str::from_utf8(chunk).unwrap())
            .collect::<Vec<_>>()
            .join("\n");

        assert_eq!(decode(&wrapped).unwrap(), text);
    }

    #[test]
    fn test_decode_invalid_base64() {
        let result = decode("not*base64!");
        assert!(matches!(result, Err(CodecError::InvalidBase64(_))));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let blob = STANDARD.encode([0xff, 0xfe, 0xfd]);
        let result = decode(&blob);
        assert!(matches!(result, Err(CodecError::InvalidUtf8(_))));
    }
}
