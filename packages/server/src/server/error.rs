//! HTTP error mapping for the gateway surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::jobs::SubmitError;

/// Errors a request can surface, mapped onto status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown task kind: {0}")]
    UnknownKind(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("task not found")]
    NotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::UnknownKind(kind) => ApiError::UnknownKind(kind),
            SubmitError::Validation(e) => ApiError::Unprocessable(e.to_string()),
            SubmitError::Internal(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::UnknownKind(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Unprocessable(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
