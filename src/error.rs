//! Error taxonomy: local validation, persistence, generation, and the
//! handler-facing `ServiceError` that maps onto HTTP responses.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Malformed input to the grader or a malformed quest definition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("expected {expected} answers, got {got}")]
    AnswerCountMismatch { expected: usize, got: usize },

    #[error("quest has no questions")]
    EmptyQuiz,

    #[error("invalid quest definition: {0}")]
    InvalidQuest(String),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Failures of the document store. Never retried by the engine.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures of the tutor / content-generation backend. Always non-fatal.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation service is not configured")]
    Disabled,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("could not parse model output: {0}")]
    Parse(String),
}

/// Everything a handler can fail with.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("could not save or load data: {0}")]
    Persistence(#[from] StoreError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("locked: {0}")]
    Locked(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("system is under maintenance")]
    Maintenance,

    #[error("invalid credential or password")]
    InvalidCredentials,
}

impl ServiceError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ServiceError::NotFound { kind, id: id.into() }
    }

    /// Stable machine-readable code used in response bodies and WS errors.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::Persistence(_) => "persistence_error",
            ServiceError::Generation(_) => "generation_error",
            ServiceError::NotFound { .. } => "not_found",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::Locked(_) => "locked",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Maintenance => "maintenance",
            ServiceError::InvalidCredentials => "invalid_credentials",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::Locked(_) | ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Maintenance | ServiceError::Persistence(_) | ServiceError::Generation(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Persistence(_) | ServiceError::Generation(_))
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(target: "questline", code = self.code(), error = %self, "Request failed");
        }
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}
