//! Error-to-HTTP translation. The only place in the system where the typed
//! error sum becomes status codes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use locarank_core::Error;

/// Standard error body: `{error, detail?, status_code}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub status_code: u16,
}

pub struct ApiError(pub Error);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self.0 {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "validation error"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not found"),
            Error::Unavailable { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "backend unavailable"),
            Error::Inference(_) => (StatusCode::INTERNAL_SERVER_ERROR, "inference error"),
            Error::Cancelled => (
                // 499 Client Closed Request; nobody is usually listening.
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                "cancelled",
            ),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
        };

        let body = ErrorBody {
            error: error.to_string(),
            detail: Some(self.0.to_string()),
            status_code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        let response = ApiError(Error::validation("bad uuid")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_maps_to_404() {
        let response = ApiError(Error::not_found("task")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unavailable_maps_to_500() {
        let response = ApiError(Error::unavailable("repository", "down")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
