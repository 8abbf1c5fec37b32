//! Maps [`StoreError`] onto the `{code, message}` JSON body and status code
//! the §4.3 table specifies. `Internal`'s diagnostic is logged, never
//! serialized into the response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kvstore_core::{ErrorCode, StoreError};
use serde_json::json;
use tracing::error;

/// Newtype so [`StoreError`] (defined in `kvstore-core`) can implement
/// axum's `IntoResponse` here without an orphan-rule violation.
pub struct ApiError(pub StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = match err.code() {
            ErrorCode::Validation => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if let StoreError::Internal { message, source } = &err {
            error!(message = %message, source = ?source, "internal error");
        }

        let body = Json(json!({
            "error": {
                "code": err.code().as_str(),
                "message": err.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn validation_error_maps_to_400() {
        let response = ApiError(StoreError::validation("bad key")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn precondition_failed_maps_to_412() {
        let response = ApiError(StoreError::precondition_failed("stale version")).into_response();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn unauthorized_maps_to_401() {
        let response = ApiError(StoreError::Unauthorized).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let response = ApiError(StoreError::NotFound).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn internal_error_maps_to_500_without_leaking_source() {
        let source = anyhow::anyhow!("connection reset by a flaky backend");
        let response =
            ApiError(StoreError::internal_from("write failed", source)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!body.contains("flaky backend"));
    }
}
