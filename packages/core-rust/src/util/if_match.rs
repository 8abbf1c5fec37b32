//! `If-Match` precondition parsing.
//!
//! Accepts either the quoted ETag form (`"N"`) or a bare decimal (`N`),
//! trimming surrounding whitespace. An absent or empty header means "no
//! precondition"; anything present but not a positive integer is a
//! precondition failure, not a validation error (callers meant to assert a
//! version, just got the syntax wrong).

use crate::error::StoreError;

/// Parses an `If-Match` header value into the version it asserts.
///
/// Returns `Ok(None)` for an absent/empty header (no precondition).
///
/// # Errors
///
/// Returns [`StoreError::PreconditionFailed`] if the header is present but
/// does not parse to a positive integer (quoted or bare).
pub fn parse_if_match(raw: Option<&str>) -> Result<Option<i64>, StoreError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);

    match unquoted.parse::<i64>() {
        Ok(version) if version > 0 => Ok(Some(version)),
        _ => Err(StoreError::precondition_failed(format!(
            "If-Match value {raw:?} is not a positive integer version"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_header_is_no_precondition() {
        assert_eq!(parse_if_match(None).unwrap(), None);
    }

    #[test]
    fn empty_header_is_no_precondition() {
        assert_eq!(parse_if_match(Some("")).unwrap(), None);
        assert_eq!(parse_if_match(Some("   ")).unwrap(), None);
    }

    #[test]
    fn quoted_form_parses() {
        assert_eq!(parse_if_match(Some("\"1\"")).unwrap(), Some(1));
        assert_eq!(parse_if_match(Some(" \"42\" ")).unwrap(), Some(42));
    }

    #[test]
    fn bare_decimal_form_parses() {
        assert_eq!(parse_if_match(Some("7")).unwrap(), Some(7));
    }

    #[test]
    fn zero_is_precondition_failure() {
        assert!(parse_if_match(Some("0")).is_err());
        assert!(parse_if_match(Some("\"0\"")).is_err());
    }

    #[test]
    fn non_numeric_is_precondition_failure() {
        assert!(parse_if_match(Some("abc")).is_err());
    }

    #[test]
    fn negative_is_precondition_failure() {
        assert!(parse_if_match(Some("-1")).is_err());
    }
}
