//! API error types and response handling.
//!
//! This module provides a unified error type for all API handlers
//! with automatic conversion to appropriate HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tagwatch_core::{SessionError, StoreError, TagwatchError};
use thiserror::Error;
use utoipa::ToSchema;

/// Attached to errors a client can retry without changing anything.
const RETRY_HINT: &str = "The failure is transient; retry the request.";

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to a specific HTTP status code and produces a
/// consistent JSON error response.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    #[error("Bad Request: {message}")]
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 404 Not Found - Resource does not exist.
    #[error("Not Found: {message}")]
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 409 Conflict - Operation cannot be completed in the current scan state.
    #[error("Conflict: {message}")]
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    #[error("Internal Error: {message}")]
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details for the log and the client.
        details: Option<String>,
    },

    /// 503 Service Unavailable - The Bluetooth radio is unavailable.
    #[error("Service Unavailable: {message}")]
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional additional details.
        details: Option<String>,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "device_not_found",
    "message": "Device not found: '5C:4A:1F:00:12:9B'",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "invalid_duration").
    #[schema(example = "device_not_found")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Device not found: '5C:4A:1F:00:12:9B'")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// The HTTP status this error is reported with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_response = match self {
            Self::BadRequest {
                error_code,
                message,
            }
            | Self::NotFound {
                error_code,
                message,
            }
            | Self::Conflict {
                error_code,
                message,
            } => ErrorResponse {
                error: error_code,
                message,
                details: None,
            },

            Self::InternalError {
                error_code,
                message,
                details,
            } => {
                tracing::error!(
                    error_code = %error_code,
                    message = %message,
                    details = ?details,
                    "Internal server error"
                );

                ErrorResponse {
                    error: error_code,
                    message,
                    details: details.map(|d| serde_json::json!(d)),
                }
            }

            Self::ServiceUnavailable {
                error_code,
                message,
                details,
            } => ErrorResponse {
                error: error_code,
                message,
                details: details.map(|d| serde_json::json!(d)),
            },
        };

        (status, Json(error_response)).into_response()
    }
}

/// Convert from tagwatch_core errors.
impl From<TagwatchError> for ApiError {
    fn from(err: TagwatchError) -> Self {
        let error_code = err.error_code().to_lowercase();
        let message = err.to_string();

        match &err {
            TagwatchError::DeviceNotFound(_) => Self::NotFound {
                error_code,
                message,
            },
            TagwatchError::NotScanning => Self::Conflict {
                error_code,
                message,
            },
            _ => {
                let details = err.is_recoverable().then(|| RETRY_HINT.to_string());
                if err.is_bluetooth_error() {
                    Self::ServiceUnavailable {
                        error_code,
                        message,
                        details,
                    }
                } else {
                    Self::InternalError {
                        error_code,
                        message,
                        details,
                    }
                }
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::from(TagwatchError::from(err))
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self::from(TagwatchError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_error() {
        let err = ApiError::BadRequest {
            error_code: "test_error".to_string(),
            message: "Test message".to_string(),
        };
        assert!(err.to_string().contains("Bad Request"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "test_error".to_string(),
            message: "Test message".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test_error"));
    }

    #[test]
    fn test_status_follows_core_error() {
        let cases = [
            (TagwatchError::DeviceNotFound("x".into()), StatusCode::NOT_FOUND),
            (TagwatchError::NotScanning, StatusCode::CONFLICT),
            (
                TagwatchError::PersistenceError("disk full".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                TagwatchError::BluetoothAdapterPoweredOff,
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, expected) in cases {
            let core_status = err.http_status_code();
            let api = ApiError::from(err);
            assert_eq!(api.status(), expected);
            assert_eq!(api.status().as_u16(), core_status);
        }
    }

    #[test]
    fn test_error_code_is_lowercase() {
        let api = ApiError::from(SessionError::NotScanning);
        match api {
            ApiError::Conflict { error_code, .. } => assert_eq!(error_code, "not_scanning"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_store_error_maps_to_internal() {
        let api = ApiError::from(StoreError::Unavailable("read-only".into()));
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        match api {
            ApiError::InternalError { details, .. } => {
                assert_eq!(details.as_deref(), Some(RETRY_HINT));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_radio_errors_are_unavailable_and_retryable_when_transient() {
        match ApiError::from(TagwatchError::BluetoothScanFailed("timeout".into())) {
            ApiError::ServiceUnavailable { details, .. } => {
                assert_eq!(details.as_deref(), Some(RETRY_HINT));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        match ApiError::from(TagwatchError::BluetoothAdapterNotFound) {
            ApiError::ServiceUnavailable { details, .. } => assert!(details.is_none()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_config_errors_are_not_retryable() {
        match ApiError::from(TagwatchError::ConfigValidationError("bad".into())) {
            ApiError::InternalError { details, .. } => assert!(details.is_none()),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
