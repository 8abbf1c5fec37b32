//! Canonical JSON size measurement, used as the value-size safety bound.
//!
//! The limit is a safety bound, not a content hash: we measure the UTF-8
//! byte length of `serde_json`'s standard (not pretty) serialization.

use crate::error::StoreError;

/// Returns the UTF-8 byte length of `value`'s canonical JSON serialization.
///
/// # Errors
///
/// Returns [`StoreError::Internal`] only if serialization itself fails,
/// which cannot happen for a `serde_json::Value` built from valid JSON.
pub fn canonical_json_len(value: &serde_json::Value) -> Result<usize, StoreError> {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len())
        .map_err(|e| StoreError::internal_from("failed to serialize value", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_utf8_byte_length() {
        let value = serde_json::json!({"enabled": true});
        assert_eq!(canonical_json_len(&value).unwrap(), r#"{"enabled":true}"#.len());
    }

    #[test]
    fn counts_multibyte_characters_by_byte_not_codepoint() {
        let value = serde_json::json!("ключ");
        let len = canonical_json_len(&value).unwrap();
        assert_eq!(len, "\"ключ\"".len());
        assert!(len > "ключ".chars().count());
    }

    #[test]
    fn null_and_empty_collections_measure_correctly() {
        assert_eq!(canonical_json_len(&serde_json::Value::Null).unwrap(), 4);
        assert_eq!(canonical_json_len(&serde_json::json!([])).unwrap(), 2);
        assert_eq!(canonical_json_len(&serde_json::json!({})).unwrap(), 2);
    }
}
