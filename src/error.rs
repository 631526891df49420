//! Domain error types for the job queue service.
//!
//! Uses thiserror for ergonomic error handling with automatic Display
//! implementations. Every error renders as `{"error": "<message>"}` with
//! the matching status code; handlers never build error bodies themselves.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing/unknown field, bad time format, bad project name, bad status
    #[error("{0}")]
    Validation(String),

    /// No or bad credentials
    #[error("Unauthorized access")]
    Unauthorized,

    /// Authenticated but not allowed (admin-only endpoint)
    #[error("Forbidden")]
    Forbidden,

    /// Unknown project / job / user
    #[error("{0} not found")]
    NotFound(String),

    /// The fetch endpoints found nothing to serve
    #[error("No unclaimed jobs available")]
    NoJobsAvailable,

    /// Duplicate job id or claim-on-claimed
    #[error("{0}")]
    Conflict(String),

    /// Non-JSON body where JSON was expected
    #[error("Expected JSON content")]
    UnsupportedMedia,

    /// Stub endpoint
    #[error("Not implemented")]
    NotImplemented,

    /// Database operation failed; reported as unavailability
    #[error("Database error: {0}")]
    Database(String),

    /// Uncaught internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NoJobsAvailable => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::UnsupportedMedia => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            AppError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status()
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::Database(detail) => {
                tracing::error!("Database error: {}", detail);
                "Database unavailable".to_string()
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                "Internal error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status()).json(ErrorResponse { error: message })
    }
}

/// Uniform error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON parsing error: {}", err))
    }
}
