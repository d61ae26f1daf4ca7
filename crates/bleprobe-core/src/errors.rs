//! Error types for bleprobe
//!
//! Three layers: [`AdapterError`] is what a radio primitive reports,
//! [`SessionError`] is what callers of the session manager see, and
//! [`CodecError`] covers payload encoding.

use thiserror::Error;

use crate::types::{CharacteristicAddress, DeviceId};

// ----------------------------------------------------------------------------
// Radio Adapter Errors
// ----------------------------------------------------------------------------

/// Failures reported by a [`RadioAdapter`](crate::RadioAdapter) primitive
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("BLE radio unavailable: {0}")]
    Unavailable(String),

    #[error("BLE radio is powered off")]
    PoweredOff,

    #[error("Device not found: {device}")]
    DeviceNotFound { device: DeviceId },

    #[error("Device not connected")]
    NotConnected,

    #[error("Link lost: {0}")]
    LinkLost(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Radio operation failed: {0}")]
    Operation(String),
}

// ----------------------------------------------------------------------------
// Session Errors
// ----------------------------------------------------------------------------

/// Errors returned by [`SessionManager`](crate::SessionManager) operations
///
/// Every variant is reported at the call site of the operation that
/// produced it. None of them are retried internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("BLE adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("BLE session not initialized")]
    NotInitialized,

    #[error("BLE initialization already in progress")]
    InitializationInProgress,

    #[error("Scan already active")]
    ScanAlreadyActive,

    #[error("Failed to control scan: {0}")]
    ScanFailed(String),

    #[error("Connection already in progress")]
    ConnectionInProgress,

    #[error("Already connected to {active}")]
    AlreadyConnected { active: DeviceId },

    #[error("Failed to connect to device: {0}")]
    ConnectionFailed(String),

    #[error("Failed to disconnect from device: {0}")]
    DisconnectFailed(String),

    #[error("Service discovery already in progress")]
    DiscoveryInProgress,

    #[error("Failed to discover services: {0}")]
    DiscoveryFailed(String),

    #[error("Descriptor not found: {address}")]
    AddressNotFound { address: CharacteristicAddress },

    #[error("Failed to read descriptor: {0}")]
    ReadFailed(String),

    #[error("Failed to write descriptor: {0}")]
    WriteFailed(String),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

// ----------------------------------------------------------------------------
// Codec Errors
// ----------------------------------------------------------------------------

/// Errors produced while encoding descriptor payloads
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Year {0} does not fit the two-byte year field")]
    YearOutOfRange(i32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_session_error_display() {
        let err = SessionError::AlreadyConnected {
            active: DeviceId::new("AA:BB"),
        };
        assert_eq!(err.to_string(), "Already connected to AA:BB");

        let err = SessionError::ReadFailed("link lost".to_string());
        assert_eq!(err.to_string(), "Failed to read descriptor: link lost");

        let address = CharacteristicAddress::new(
            Uuid::from_u128(1),
            Uuid::from_u128(2),
            Uuid::from_u128(3),
        );
        let err = SessionError::AddressNotFound { address };
        assert!(err.to_string().starts_with("Descriptor not found: "));
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::YearOutOfRange(70_000);
        assert_eq!(
            err.to_string(),
            "Year 70000 does not fit the two-byte year field"
        );
    }
}
