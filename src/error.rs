//! Memory Integrity Grid error types
//!
//! Only infrastructure failures and programmer errors travel through
//! [`Error`]. Domain outcomes (not-found, conflicts, approval deferral,
//! integrity failures) are reported in structured result objects.

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Grid error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisted store error (corrupt document, failed write)
    #[error("Store error: {0}")]
    Store(String),

    /// Caller passed something the grid cannot act on
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error, e.g. a blocking task that panicked
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for grid operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status reported for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// API error response body
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

/// API error detail
#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl From<&Error> for ApiError {
    fn from(err: &Error) -> Self {
        match err.status_code() {
            StatusCode::BAD_REQUEST => Self::bad_request(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

/// Serialize a value for an HTTP response body, falling back to `null`.
pub fn to_json<T: Serialize>(value: T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

/// Turn a grid error into an HTTP response.
pub fn error_response(err: Error) -> (StatusCode, Json<serde_json::Value>) {
    tracing::warn!(error = %err, "Request failed");
    (err.status_code(), Json(to_json(ApiError::from(&err))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Store("incidents/acme.json is corrupt".to_string());
        assert_eq!(err.to_string(), "Store error: incidents/acme.json is corrupt");

        let err = Error::InvalidInput("unknown action kind: nuke".to_string());
        assert!(err.to_string().contains("unknown action kind"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            Error::InvalidInput("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Store("gone".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::Internal("lock task panicked".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let body = to_json(ApiError::from(&Error::InvalidInput("bad tenant".to_string())));
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[test]
    fn test_to_json() {
        let value = to_json(vec![1, 2, 3]);
        assert_eq!(value, serde_json::json!([1, 2, 3]));
    }
}
