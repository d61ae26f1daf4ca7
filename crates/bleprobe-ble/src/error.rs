//! Error types for the btleplug adapter

use bleprobe_core::{AdapterError, DeviceId};
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the btleplug radio adapter
#[derive(Error, Debug)]
pub enum BleError {
    #[error("Failed to create BLE manager: {0}")]
    ManagerUnavailable(String),

    #[error("No BLE adapter at index {index} ({available} available)")]
    AdapterNotFound { index: usize, available: usize },

    #[error("BLE adapter not initialized")]
    NotInitialized,

    #[error("Peripheral not found: {device}")]
    PeripheralNotFound { device: DeviceId },

    #[error("Descriptor not found: {0}")]
    DescriptorNotFound(String),

    #[error("Failed to get BLE events: {0}")]
    EventStreamFailed(String),

    #[error(transparent)]
    Btleplug(#[from] btleplug::Error),
}

impl From<BleError> for AdapterError {
    fn from(err: BleError) -> Self {
        match err {
            BleError::ManagerUnavailable(reason) | BleError::EventStreamFailed(reason) => {
                AdapterError::Unavailable(reason)
            }
            err @ BleError::AdapterNotFound { .. } => AdapterError::Unavailable(err.to_string()),
            BleError::NotInitialized => AdapterError::PoweredOff,
            BleError::PeripheralNotFound { device } => AdapterError::DeviceNotFound { device },
            BleError::DescriptorNotFound(address) => AdapterError::AttributeNotFound(address),
            BleError::Btleplug(err) => match err {
                btleplug::Error::PermissionDenied => AdapterError::PermissionDenied,
                btleplug::Error::NotConnected => AdapterError::NotConnected,
                btleplug::Error::TimedOut(_) => AdapterError::Timeout,
                other => AdapterError::Operation(other.to_string()),
            },
        }
    }
}

/// Result type for btleplug adapter internals
pub type BleResult<T> = Result<T, BleError>;
