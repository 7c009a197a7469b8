use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use playground_core::generator::GeneratorError;

use crate::extract::ExtractError;

/// An error carrying its HTTP status, rendered as `{"detail": "..."}` like
/// every other failure response in the API.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    pub fn unprocessable(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}

impl From<GeneratorError> for ApiError {
    fn from(err: GeneratorError) -> Self {
        let status = match err {
            // Misconfiguration is our fault, upstream trouble is a bad gateway.
            GeneratorError::Unconfigured => StatusCode::INTERNAL_SERVER_ERROR,
            GeneratorError::Unreachable(_)
            | GeneratorError::Provider { .. }
            | GeneratorError::Malformed(_) => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            detail: err.to_string(),
        }
    }
}

impl From<ExtractError> for ApiError {
    fn from(err: ExtractError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: err.to_string(),
        }
    }
}
