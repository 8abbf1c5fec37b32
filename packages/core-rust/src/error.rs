//! The five-member error taxonomy raised by the storage service and adapters.

use thiserror::Error;

/// Stable machine code carried by every [`StoreError`], mirrored to the HTTP
/// edge's status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Validation,
    Unauthorized,
    NotFound,
    PreconditionFailed,
    Internal,
}

impl ErrorCode {
    /// Machine-readable code string, stable across releases.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NotFound => "NOT_FOUND",
            Self::PreconditionFailed => "PRECONDITION_FAILED",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

/// The only failure kinds the core raises.
///
/// `Internal` carries the original diagnostic separately from `message` so
/// that it can be logged without leaking backend detail to callers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{message}")]
    Validation { message: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("precondition failed: {message}")]
    PreconditionFailed { message: String },

    #[error("internal error")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl StoreError {
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps a lower-level error as an internal failure, retaining the
    /// original diagnostic for logging (never surfaced to the public message).
    pub fn internal_from(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Stable machine code for this error, used by the HTTP edge's
    /// status-code mapping (see `DESIGN.md`).
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::Validation,
            Self::Unauthorized => ErrorCode::Unauthorized,
            Self::NotFound => ErrorCode::NotFound,
            Self::PreconditionFailed { .. } => ErrorCode::PreconditionFailed,
            Self::Internal { .. } => ErrorCode::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_stable_strings() {
        assert_eq!(ErrorCode::Validation.as_str(), "VALIDATION_ERROR");
        assert_eq!(ErrorCode::Unauthorized.as_str(), "UNAUTHORIZED");
        assert_eq!(ErrorCode::NotFound.as_str(), "NOT_FOUND");
        assert_eq!(
            ErrorCode::PreconditionFailed.as_str(),
            "PRECONDITION_FAILED"
        );
        assert_eq!(ErrorCode::Internal.as_str(), "INTERNAL_ERROR");
    }

    #[test]
    fn validation_constructor_sets_code() {
        let err = StoreError::validation("key too long");
        assert_eq!(err.code(), ErrorCode::Validation);
        assert_eq!(err.to_string(), "key too long");
    }

    #[test]
    fn precondition_failed_constructor_sets_code() {
        let err = StoreError::precondition_failed("version mismatch");
        assert_eq!(err.code(), ErrorCode::PreconditionFailed);
    }

    #[test]
    fn internal_from_retains_source_out_of_display() {
        let source = anyhow::anyhow!("connection reset by peer");
        let err = StoreError::internal_from("write failed", source);
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(err.to_string(), "internal error");
    }
}
