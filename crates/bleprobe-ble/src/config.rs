//! btleplug adapter configuration

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the btleplug radio adapter
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BtleplugConfig {
    /// Which host adapter to use when several are present
    pub adapter_index: usize,
    /// Capacity of the disconnect event broadcast channel
    pub disconnect_buffer_size: usize,
}

impl Default for BtleplugConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            disconnect_buffer_size: 16,
        }
    }
}

impl BtleplugConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the host adapter by index
    pub fn with_adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// Set disconnect channel capacity
    pub fn with_disconnect_buffer_size(mut self, size: usize) -> Self {
        self.disconnect_buffer_size = size.max(1);
        self
    }
}
