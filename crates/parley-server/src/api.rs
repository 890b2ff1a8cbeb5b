//! HTTP error mapping shared by the API handlers.

use axum::{
    extract::Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use parley_interview::InterviewError;
use thiserror::Error;

use crate::error::EngineError;
use crate::webhook::WebhookError;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::InternalServerError(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<InterviewError> for ApiError {
    fn from(err: InterviewError) -> Self {
        match err {
            InterviewError::Validation(_) | InterviewError::AlreadyAnswered { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            InterviewError::InvalidState { .. } => ApiError::Conflict(err.to_string()),
            InterviewError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            InterviewError::Database(_) => ApiError::InternalServerError(err.to_string()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Interview(e) => e.into(),
            EngineError::Validation(msg) => ApiError::BadRequest(msg),
            EngineError::ServiceUnavailable(msg) => ApiError::ServiceUnavailable(msg),
            EngineError::Pool(_) | EngineError::Internal(_) => {
                ApiError::InternalServerError(err.to_string())
            }
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Auth(msg) => ApiError::Unauthorized(msg),
            WebhookError::Malformed(_) | WebhookError::UnknownEvent(_) => {
                ApiError::BadRequest(err.to_string())
            }
            WebhookError::Engine(e) => e.into(),
        }
    }
}
