//! Error types for the license pre-validation service.
//!
//! `AppError` is what HTTP handlers return. The remaining enums form the
//! pipeline taxonomy: each one is contained to the work item that raised it.

use actix_web::{HttpResponse, ResponseError};
use std::fmt;

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Webhook signature rejected
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Remote VCS call failed while serving a request
    #[error("VCS error: {0}")]
    Vcs(String),

    /// License catalog could not be rebuilt
    #[error("License catalog error: {0}")]
    Catalog(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_code, response_message) = match self {
            AppError::Database(err_str) => {
                tracing::error!("Database error: {}", err_str);
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            AppError::NotFound(_) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "NOT_FOUND",
                self.to_string(),
            ),
            AppError::InvalidInput(_) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                self.to_string(),
            ),
            AppError::Unauthorized(_) => (
                actix_web::http::StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                self.to_string(),
            ),
            AppError::Forbidden(_) => (
                actix_web::http::StatusCode::FORBIDDEN,
                "FORBIDDEN",
                self.to_string(),
            ),
            AppError::Vcs(err_str) => {
                tracing::warn!("VCS error: {}", err_str);
                (
                    actix_web::http::StatusCode::BAD_GATEWAY,
                    "VCS_ERROR",
                    self.to_string(),
                )
            }
            AppError::Catalog(err_str) => {
                tracing::error!("License catalog error: {}", err_str);
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "CATALOG_ERROR",
                    self.to_string(),
                )
            }
        };

        HttpResponse::build(status).json(ErrorResponse {
            error: error_code.to_string(),
            message: response_message,
        })
    }
}

/// Error response body matching OpenAPI schema.
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

// Conversion implementations for common error types

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("Invalid UUID: {}", err))
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::Catalog(err.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MalformedPayload(_) => AppError::InvalidInput(err.to_string()),
            _ => AppError::Forbidden(err.to_string()),
        }
    }
}

/// Webhook authentication failures. Rejected requests never touch the queue.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("malformed signature header")]
    MalformedSignature,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("webhook secret is not configured")]
    SecretNotConfigured,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// The service cannot read the repository or pull request.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("credentials rejected for {0}")]
    Unauthorized(String),

    #[error("{0} is not visible to the service")]
    NotFound(String),

    #[error("access check failed for {repository}: {reason}")]
    Unavailable { repository: String, reason: String },
}

/// Detector subprocess or output failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectorError {
    #[error("failed to start detector '{command}': {reason}")]
    Spawn { command: String, reason: String },

    #[error("detector exited with status {0}")]
    ExitStatus(i32),

    #[error("detector terminated by signal")]
    Killed,

    #[error("malformed detector record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("detector did not finish within {0}s")]
    Timeout(u64),

    #[error("detector I/O error: {0}")]
    Io(String),
}

/// Failure while communicating results back to the VCS host.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("VCS rejected report: {message}")]
    Rejected { message: String, retryable: bool },

    #[error("report retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl ReportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReportError::Rejected { retryable: true, .. })
    }
}

/// Transport-level error from the VCS client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VcsError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl VcsError {
    /// Whether repeating the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            VcsError::RateLimited { .. } | VcsError::Transport(_) => true,
            VcsError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Convert into an access failure for `repository`.
    pub fn into_access(self, repository: &str) -> AccessError {
        match self {
            VcsError::Unauthorized | VcsError::Forbidden(_) => {
                AccessError::Unauthorized(repository.to_string())
            }
            VcsError::NotFound(_) => AccessError::NotFound(repository.to_string()),
            other => AccessError::Unavailable {
                repository: repository.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<VcsError> for ReportError {
    fn from(err: VcsError) -> Self {
        ReportError::Rejected {
            retryable: err.is_transient(),
            message: err.to_string(),
        }
    }
}

impl From<VcsError> for AppError {
    fn from(err: VcsError) -> Self {
        match err {
            VcsError::NotFound(what) => AppError::NotFound(what),
            other => AppError::Vcs(other.to_string()),
        }
    }
}
