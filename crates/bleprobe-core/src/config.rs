//! Session manager configuration

use std::time::Duration;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the BLE session manager
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionConfig {
    /// Maximum time to wait for the radio to confirm power-on
    pub power_on_timeout: Duration,
    /// Maximum time to wait for a connection to be established
    pub connection_timeout: Duration,
    /// Capacity of the session event broadcast channel
    pub event_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            power_on_timeout: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(10),
            event_buffer_size: 64,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set power-on timeout
    pub fn with_power_on_timeout(mut self, timeout: Duration) -> Self {
        self.power_on_timeout = timeout;
        self
    }

    /// Set connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set event channel capacity
    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size.max(1);
        self
    }
}
