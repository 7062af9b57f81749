//! Error handling for the HTTP server
//!
//! Defines how errors become HTTP responses. Clients get a short machine
//! readable code; the full error is logged.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ridescore_core::Error as CoreError;
use serde::Serialize;
use std::fmt;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, AppError>;

/// Application errors that can occur in HTTP handlers
#[derive(Debug)]
pub enum AppError {
    /// Feature view not found (404)
    NotFound(String),

    /// Invalid request (400)
    BadRequest(String),

    /// Internal server error (500)
    Internal(String),

    /// Error from the core library; status depends on the variant
    Core(CoreError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::Core(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// HTTP status and error code for this error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            AppError::Core(err) => match err {
                CoreError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                CoreError::Provider(_) => (StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_ERROR"),
                CoreError::Connection(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "CONNECTION_ERROR")
                }
                CoreError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
                CoreError::Prediction(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PREDICTION_ERROR"),
                CoreError::Configuration(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
                }
                CoreError::ModelLoad(_) => (StatusCode::INTERNAL_SERVER_ERROR, "MODEL_LOAD_ERROR"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        }
    }
}

/// Convert AppError into an HTTP response
///
/// ## Error Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "INVALID_INPUT",
///     "message": "Invalid input: request is missing entity 'driver'"
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(code = error_code, "Request error: {}", self);
        } else {
            tracing::debug!(code = error_code, "Request rejected: {}", self);
        }

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: error_code.to_string(),
                message: self.to_string(),
            },
        };

        (status, Json(error_response)).into_response()
    }
}

/// Error response sent to clients
#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND")
    code: String,

    /// Human-readable error message
    message: String,
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        AppError::Core(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", err))
    }
}
