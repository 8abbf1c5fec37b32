//! Pure request validation against [`ServiceLimits`], run before any
//! adapter call so invalid input never reaches a backend.

use kvstore_core::{util::canonical_json_len, StoreError};

use super::limits::ServiceLimits;

/// Validates a caller-supplied key against `limits.max_key_length`.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] if `key` is empty or exceeds the
/// configured maximum length.
pub fn validate_key(key: &str, limits: &ServiceLimits) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::validation("key must not be empty"));
    }
    if key.len() > limits.max_key_length {
        return Err(StoreError::validation(format!(
            "key length {} exceeds maxKeyLength {}",
            key.len(),
            limits.max_key_length
        )));
    }
    Ok(())
}

/// Validates a value's canonical JSON size against `limits.max_value_bytes`.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] if the value's serialized byte length
/// exceeds the configured maximum.
pub fn validate_value(value: &serde_json::Value, limits: &ServiceLimits) -> Result<(), StoreError> {
    let len = canonical_json_len(value)?;
    if len > limits.max_value_bytes {
        return Err(StoreError::validation(format!(
            "value size {} bytes exceeds maxValueBytes {}",
            len, limits.max_value_bytes
        )));
    }
    Ok(())
}

/// Validates an optional TTL: when present, must be a positive integer
/// number of seconds.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] if `ttl_seconds` is present and not
/// strictly positive.
pub fn validate_ttl(ttl_seconds: Option<i64>) -> Result<(), StoreError> {
    match ttl_seconds {
        Some(seconds) if seconds <= 0 => Err(StoreError::validation(
            "ttlSeconds must be a positive integer",
        )),
        _ => Ok(()),
    }
}

/// Validates a non-empty, bounded batch of keys or entries.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] if `count` is zero or exceeds
/// `limits.max_batch_size`.
pub fn validate_batch_size(count: usize, limits: &ServiceLimits) -> Result<(), StoreError> {
    if count == 0 {
        return Err(StoreError::validation("batch must not be empty"));
    }
    if count > limits.max_batch_size {
        return Err(StoreError::validation(format!(
            "batch size {} exceeds maxBatchSize {}",
            count, limits.max_batch_size
        )));
    }
    Ok(())
}

/// Validates an optional `list` prefix against `limits.max_key_length`.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] if `prefix` exceeds the configured
/// maximum key length.
pub fn validate_prefix(prefix: Option<&str>, limits: &ServiceLimits) -> Result<(), StoreError> {
    if let Some(prefix) = prefix {
        if prefix.len() > limits.max_key_length {
            return Err(StoreError::validation(format!(
                "prefix length {} exceeds maxKeyLength {}",
                prefix.len(),
                limits.max_key_length
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ServiceLimits {
        ServiceLimits::for_tests()
    }

    #[test]
    fn validate_key_rejects_empty() {
        assert!(validate_key("", &limits()).is_err());
    }

    #[test]
    fn validate_key_rejects_too_long() {
        let key = "k".repeat(256);
        assert!(validate_key(&key, &limits()).is_err());
    }

    #[test]
    fn validate_key_accepts_within_bound() {
        assert!(validate_key("k".repeat(255).as_str(), &limits()).is_ok());
    }

    #[test]
    fn validate_value_rejects_oversize() {
        let big = serde_json::Value::String("x".repeat(2_000_000));
        assert!(validate_value(&big, &limits()).is_err());
    }

    #[test]
    fn validate_value_accepts_within_bound() {
        let value = serde_json::json!({"a": 1});
        assert!(validate_value(&value, &limits()).is_ok());
    }

    #[test]
    fn validate_ttl_rejects_zero_and_negative() {
        assert!(validate_ttl(Some(0)).is_err());
        assert!(validate_ttl(Some(-1)).is_err());
    }

    #[test]
    fn validate_ttl_accepts_absent_and_positive() {
        assert!(validate_ttl(None).is_ok());
        assert!(validate_ttl(Some(60)).is_ok());
    }

    #[test]
    fn validate_batch_size_rejects_empty_and_oversize() {
        assert!(validate_batch_size(0, &limits()).is_err());
        assert!(validate_batch_size(101, &limits()).is_err());
    }

    #[test]
    fn validate_batch_size_accepts_within_bound() {
        assert!(validate_batch_size(100, &limits()).is_ok());
    }

    #[test]
    fn validate_prefix_rejects_too_long() {
        let prefix = "p".repeat(256);
        assert!(validate_prefix(Some(&prefix), &limits()).is_err());
    }

    #[test]
    fn validate_prefix_accepts_absent() {
        assert!(validate_prefix(None, &limits()).is_ok());
    }
}
