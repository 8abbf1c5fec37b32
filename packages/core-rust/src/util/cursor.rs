//! Opaque base64url cursor encoding for `list` pagination.
//!
//! A cursor is nothing but the raw UTF-8 bytes of the last key emitted on
//! the previous page, base64url-encoded (no padding). Callers must treat it
//! as opaque; only the `list` implementation decodes it, and only to do a
//! `key > cursor_key` comparison.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::error::StoreError;

/// Encodes a key as an opaque cursor.
#[must_use]
pub fn encode_cursor(last_key: &str) -> String {
    URL_SAFE_NO_PAD.encode(last_key.as_bytes())
}

/// Decodes a cursor back into the key it was derived from.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] if the cursor is not valid base64url
/// or does not decode to valid UTF-8.
pub fn decode_cursor(cursor: &str) -> Result<String, StoreError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| StoreError::validation("cursor is not valid base64url"))?;
    String::from_utf8(bytes).map_err(|_| StoreError::validation("cursor does not decode to UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_key_bytes() {
        for key in ["a", "user:1", "", "with spaces", "unicode-ключ"] {
            let cursor = encode_cursor(key);
            assert_eq!(decode_cursor(&cursor).unwrap(), key);
        }
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        assert!(decode_cursor("not base64url!!!").is_err());
    }

    #[test]
    fn encoded_cursor_has_no_padding_or_plus_slash() {
        let cursor = encode_cursor("a long enough key to force padding in standard base64==");
        assert!(!cursor.contains('='));
        assert!(!cursor.contains('+'));
        assert!(!cursor.contains('/'));
    }

    proptest::proptest! {
        #[test]
        fn round_trip_preserves_arbitrary_key_bytes(key in ".*") {
            let cursor = encode_cursor(&key);
            proptest::prop_assert_eq!(decode_cursor(&cursor).unwrap(), key);
        }
    }
}
