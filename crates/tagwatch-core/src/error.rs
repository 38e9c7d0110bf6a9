//! Unified error types for the tagwatch core library.
//!
//! Each module has its own error type ([`StoreError`], [`SessionError`],
//! [`ConfigError`]). [`TagwatchError`] folds them into one enum for callers
//! that deal with several modules at once, such as the HTTP server.
//!
//! Classification never produces an error: malformed advertisements resolve
//! to the generic fallback.
//!
//! # Example
//!
//! ```rust
//! use tagwatch_core::error::{Result, TagwatchError};
//!
//! fn require_scan(scanning: bool) -> Result<()> {
//!     if !scanning {
//!         return Err(TagwatchError::NotScanning);
//!     }
//!     Ok(())
//! }
//! # assert!(require_scan(false).is_err());
//! ```
//!
//! [`StoreError`]: crate::store::StoreError
//! [`SessionError`]: crate::session::SessionError
//! [`ConfigError`]: crate::config::ConfigError

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all tagwatch operations.
#[derive(Debug, Error)]
pub enum TagwatchError {
    // =========================================================================
    // RADIO ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded."
    )]
    BluetoothAdapterNotFound,

    /// The Bluetooth adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off. Run 'bluetoothctl power on' to enable.")]
    BluetoothAdapterPoweredOff,

    /// Bluetooth discovery failed.
    #[error("Bluetooth scan failed: {0}")]
    BluetoothScanFailed(String),

    // =========================================================================
    // SESSION ERRORS
    // =========================================================================
    /// The operation needs a running scan.
    #[error("No scan is in progress. Start a scan first.")]
    NotScanning,

    /// A scan timer was requested outside an async runtime.
    #[error("Scan timer unavailable: no async runtime is running")]
    NoRuntime,

    /// No record exists for the requested device.
    #[error("Device not found: '{0}'")]
    DeviceNotFound(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for tagwatch operations.
pub type Result<T> = std::result::Result<T, TagwatchError>;

impl TagwatchError {
    /// Returns `true` if this error is related to the radio.
    #[inline]
    #[must_use]
    pub const fn is_bluetooth_error(&self) -> bool {
        matches!(
            self,
            Self::BluetoothAdapterNotFound
                | Self::BluetoothAdapterPoweredOff
                | Self::BluetoothScanFailed(_)
        )
    }

    /// Returns `true` if retrying later may succeed without user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::BluetoothScanFailed(_) | Self::PersistenceError(_))
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 404 Not Found
            Self::ConfigNotFound(_) | Self::DeviceNotFound(_) => 404,

            // 409 Conflict - valid request, wrong session state
            Self::NotScanning => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error - server-side issues
            Self::PersistenceError(_) | Self::IoError(_) | Self::NoRuntime => 500,

            // 503 Service Unavailable - radio hardware issues
            Self::BluetoothAdapterNotFound
            | Self::BluetoothAdapterPoweredOff
            | Self::BluetoothScanFailed(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::BluetoothAdapterNotFound => "BLUETOOTH_ADAPTER_NOT_FOUND",
            Self::BluetoothAdapterPoweredOff => "BLUETOOTH_ADAPTER_POWERED_OFF",
            Self::BluetoothScanFailed(_) => "BLUETOOTH_SCAN_FAILED",
            Self::NotScanning => "NOT_SCANNING",
            Self::NoRuntime => "NO_RUNTIME",
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for TagwatchError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path.into()),
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {path}: {source}"))
            }
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
            ConfigError::NoDirectory(kind) => {
                Self::PersistenceError(format!("Cannot determine the {kind} directory"))
            }
        }
    }
}

impl From<crate::store::StoreError> for TagwatchError {
    fn from(err: crate::store::StoreError) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

impl From<crate::session::SessionError> for TagwatchError {
    fn from(err: crate::session::SessionError) -> Self {
        use crate::session::SessionError;
        match err {
            SessionError::NoRuntime => Self::NoRuntime,
            SessionError::NotScanning => Self::NotScanning,
        }
    }
}

#[cfg(feature = "bluetooth")]
impl From<crate::bluez::BluezError> for TagwatchError {
    fn from(err: crate::bluez::BluezError) -> Self {
        use crate::bluez::BluezError;
        match err {
            BluezError::NoRuntime => Self::NoRuntime,
            BluezError::Bluer(e) if matches!(e.kind, bluer::ErrorKind::NotReady) => {
                Self::BluetoothAdapterPoweredOff
            }
            BluezError::Bluer(e) if matches!(e.kind, bluer::ErrorKind::NotFound) => {
                Self::BluetoothAdapterNotFound
            }
            BluezError::Bluer(e) => Self::BluetoothScanFailed(e.to_string()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::session::SessionError;
    use crate::store::StoreError;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_bluetooth_error_classification() {
        assert!(TagwatchError::BluetoothAdapterNotFound.is_bluetooth_error());
        assert!(TagwatchError::BluetoothAdapterPoweredOff.is_bluetooth_error());
        assert!(TagwatchError::BluetoothScanFailed("test".into()).is_bluetooth_error());
        assert!(!TagwatchError::NotScanning.is_bluetooth_error());
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(TagwatchError::BluetoothScanFailed("timeout".into()).is_recoverable());
        assert!(TagwatchError::PersistenceError("busy".into()).is_recoverable());
        assert!(!TagwatchError::BluetoothAdapterNotFound.is_recoverable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(TagwatchError::DeviceNotFound("A".into()).http_status_code(), 404);
        assert_eq!(TagwatchError::NotScanning.http_status_code(), 409);
        assert_eq!(
            TagwatchError::ConfigValidationError("error".into()).http_status_code(),
            422
        );
        assert_eq!(
            TagwatchError::PersistenceError("error".into()).http_status_code(),
            500
        );
        assert_eq!(TagwatchError::BluetoothAdapterNotFound.http_status_code(), 503);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            TagwatchError::BluetoothAdapterNotFound.error_code(),
            "BLUETOOTH_ADAPTER_NOT_FOUND"
        );
        assert_eq!(TagwatchError::NotScanning.error_code(), "NOT_SCANNING");
        assert_eq!(
            TagwatchError::ConfigNotFound(PathBuf::new()).error_code(),
            "CONFIG_NOT_FOUND"
        );
    }

    #[test]
    fn test_from_module_errors() {
        let err: TagwatchError = SessionError::NotScanning.into();
        assert!(matches!(err, TagwatchError::NotScanning));

        let err: TagwatchError = StoreError::Unavailable("locked".into()).into();
        assert!(matches!(err, TagwatchError::PersistenceError(_)));
        assert!(err.to_string().contains("locked"));

        let err: TagwatchError = ConfigError::MultipleValidationErrors(vec![
            ConfigError::ValidationError {
                field: "a".into(),
                message: "bad".into(),
            },
            ConfigError::ValidationError {
                field: "b".into(),
                message: "worse".into(),
            },
        ])
        .into();
        match err {
            TagwatchError::ConfigValidationError(message) => {
                assert!(message.contains("a: bad"));
                assert!(message.contains("b: worse"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoErr::new(ErrorKind::NotFound, "file not found");
        let err: TagwatchError = io_err.into();
        assert!(matches!(err, TagwatchError::IoError(_)));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<TagwatchError>();
        assert_sync::<TagwatchError>();
    }
}
