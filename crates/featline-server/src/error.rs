//! Error handling for the HTTP server
//!
//! Maps errors to HTTP responses: meaningful messages for clients, full
//! detail in the logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use featline_core::{Error as CoreError, ErrorCategory};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T> = std::result::Result<T, AppError>;

/// Application errors that can occur in HTTP handlers
#[derive(Debug)]
pub enum AppError {
    /// Malformed request body (400)
    BadRequest(String),

    /// Internal server error (500)
    Internal(String),

    /// Error from the retrieval path
    Core(CoreError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::Core(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// HTTP status and machine-readable code
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            AppError::Core(err) => (core_status(err), core_code(err)),
        }
    }
}

fn core_status(err: &CoreError) -> StatusCode {
    match err.category() {
        ErrorCategory::Definition if err.is_not_found() => StatusCode::NOT_FOUND,
        ErrorCategory::Definition => StatusCode::BAD_REQUEST,
        ErrorCategory::Store => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::Cancellation => match err {
            CoreError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        },
        ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn core_code(err: &CoreError) -> &'static str {
    match err {
        CoreError::FeatureViewNotFound { .. } => "FEATURE_VIEW_NOT_FOUND",
        CoreError::FeatureNotFound { .. } => "FEATURE_NOT_FOUND",
        CoreError::FeatureServiceNotFound { .. } => "FEATURE_SERVICE_NOT_FOUND",
        CoreError::InvalidFeatureReference(_) => "INVALID_FEATURE_REFERENCE",
        CoreError::NotServableOnline(_) => "NOT_SERVABLE_ONLINE",
        CoreError::MissingRequestData { .. } => "MISSING_REQUEST_DATA",
        CoreError::InvalidRequestData { .. } => "INVALID_REQUEST_DATA",
        CoreError::MissingEntityKey { .. } => "MISSING_ENTITY_KEY",
        CoreError::OnDemandDisabled(_) => "ON_DEMAND_DISABLED",
        CoreError::InvalidDefinition(_) => "INVALID_DEFINITION",
        CoreError::InvalidInput(_) => "INVALID_INPUT",
        CoreError::StorageError(_) | CoreError::StoreReadFailed { .. } => "STORE_UNAVAILABLE",
        CoreError::DeadlineExceeded => "DEADLINE_EXCEEDED",
        CoreError::Cancelled => "CANCELLED",
        CoreError::SerializationError(_)
        | CoreError::ConfigError(_)
        | CoreError::InternalError(_) => "INTERNAL_ERROR",
    }
}

/// Error response format
///
/// ```json
/// {
///   "error": {
///     "code": "FEATURE_VIEW_NOT_FOUND",
///     "message": "Feature view 'driver_stats' not found in project 'rides'"
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(code, "Request error: {}", self);
        } else {
            tracing::debug!(code, "Request rejected: {}", self);
        }

        // Storage internals stay in the logs
        let message = match &self {
            AppError::Core(CoreError::StorageError(_)) => "online store unavailable".to_string(),
            AppError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
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
