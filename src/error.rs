// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::engine::EngineError;
use crate::services::AssessmentError;
use crate::store::StoreError;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    // 500 Internal Server Error
    #[error("internal server error: {0}")]
    InternalServerError(String),

    // 400 Bad Request
    #[error("bad request: {0}")]
    BadRequest(String),

    // 400 Bad Request carrying a machine-readable kind
    #[error("invalid input: {message}")]
    InvalidInput { kind: &'static str, message: String },

    // 401 Unauthorized
    #[error("unauthorized: {0}")]
    AuthError(String),

    // 403 Forbidden (e.g., blocked candidate)
    #[error("forbidden: {message}")]
    Forbidden { kind: &'static str, message: String },

    // 404 Not Found
    #[error("not found: {0}")]
    NotFound(String),

    // 409 Conflict: the request clashes with the assessment's current state
    #[error("conflict: {message}")]
    Conflict { kind: &'static str, message: String },

    // 503 Service Unavailable: retryable once an operator fixes the cause
    #[error("unavailable: {message}")]
    ServiceUnavailable { kind: &'static str, message: String },
}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response `{"error", "kind"}` with the
/// appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::InvalidInput { kind, message } => (StatusCode::BAD_REQUEST, kind, message),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            AppError::Forbidden { kind, message } => (StatusCode::FORBIDDEN, kind, message),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::Conflict { kind, message } => (StatusCode::CONFLICT, kind, message),
            AppError::ServiceUnavailable { kind, message } => {
                tracing::warn!("Service unavailable ({}): {}", kind, message);
                (StatusCode::SERVICE_UNAVAILABLE, kind, message)
            }
        };
        let body = Json(json!({
            "error": error_message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound("Record not found".to_string()),
            StoreError::Frozen(_) => AppError::Conflict {
                kind: "question_frozen",
                message: err.to_string(),
            },
            StoreError::Conflict(_) | StoreError::ActiveExists(_) => AppError::Conflict {
                kind: "concurrent_modification",
                message: err.to_string(),
            },
            StoreError::Corrupt(_) | StoreError::Database(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

impl From<AssessmentError> for AppError {
    fn from(err: AssessmentError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        match err {
            AssessmentError::UserBlocked => AppError::Forbidden { kind, message },
            AssessmentError::NoActiveAssessment => AppError::NotFound(message),
            AssessmentError::StaleQuestionSet { .. } => AppError::InvalidInput { kind, message },
            AssessmentError::AssessmentAlreadyActive
            | AssessmentError::StepNotCurrent { .. }
            | AssessmentError::StepNotOpened(_)
            | AssessmentError::StepAlreadySubmitted(_) => AppError::Conflict { kind, message },
            AssessmentError::Engine(EngineError::InsufficientQuestionPool { .. }) => {
                AppError::ServiceUnavailable { kind, message }
            }
            AssessmentError::Engine(EngineError::UnknownStep(_) | EngineError::UnknownLevel(_)) => {
                AppError::InvalidInput { kind, message }
            }
            AssessmentError::Engine(EngineError::StepNotCompleted(_)) => AppError::InternalServerError(message),
            AssessmentError::Store(store) => AppError::from(store),
        }
    }
}
