// Error handling utilities and response helpers

use crate::error::MirageError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Helper to create a JSON error response
pub fn json_error(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(json!({ "error": message }))).into_response()
}

/// Helper for "not found" errors
pub fn not_found(message: &str) -> Response {
    json_error(StatusCode::NOT_FOUND, message)
}

/// Helper for bad request errors
pub fn bad_request(message: &str) -> Response {
    json_error(StatusCode::BAD_REQUEST, message)
}

impl IntoResponse for MirageError {
    fn into_response(self) -> Response {
        let status = match &self {
            // Tombstoned DIDs are reported as absent, not as 410
            MirageError::NotFound(_) | MirageError::Gone => StatusCode::NOT_FOUND,
            MirageError::BadInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        json_error(status, &self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            MirageError::NotFound("did").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            MirageError::Gone.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            MirageError::BadInput("handle").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            MirageError::Upstream("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
