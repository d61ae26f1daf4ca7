//! bleprobe CLI configuration
//!
//! Loaded from a TOML file passed with `--config`; every section and field
//! is optional and falls back to its default. Durations are plain integers
//! with the unit in the field name.
//!
//! ```toml
//! [session]
//! power_on_timeout_ms = 5000
//! connection_timeout_ms = 10000
//!
//! [radio]
//! adapter_index = 0
//!
//! [flow]
//! device_name = "nRF Time Probe"
//! scan_timeout_secs = 15
//! disconnect_wait_secs = 30
//! ```

use std::path::Path;
use std::time::Duration;

use bleprobe_ble::BtleplugConfig;
use bleprobe_core::SessionConfig;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the bleprobe CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionSettings,
    pub radio: RadioSettings,
    pub flow: FlowSettings,
}

/// Session manager timeouts and buffering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub power_on_timeout_ms: u64,
    pub connection_timeout_ms: u64,
    pub event_buffer_size: usize,
}

/// Host radio selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioSettings {
    pub adapter_index: usize,
    pub disconnect_buffer_size: usize,
}

/// Defaults for the diagnostic flows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    /// Device to look for when `--name` is not given
    pub device_name: Option<String>,
    /// How long `scan` runs without `--duration`
    pub scan_duration_secs: u64,
    /// How long `autodisconnect` looks for the device
    pub scan_timeout_secs: u64,
    /// How long `autodisconnect` waits for a disconnect without `--wait`
    pub disconnect_wait_secs: u64,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for SessionSettings {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            power_on_timeout_ms: session.power_on_timeout.as_millis() as u64,
            connection_timeout_ms: session.connection_timeout.as_millis() as u64,
            event_buffer_size: session.event_buffer_size,
        }
    }
}

impl Default for RadioSettings {
    fn default() -> Self {
        let radio = BtleplugConfig::default();
        Self {
            adapter_index: radio.adapter_index,
            disconnect_buffer_size: radio.disconnect_buffer_size,
        }
    }
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            device_name: None,
            scan_duration_secs: 10,
            scan_timeout_secs: 15,
            disconnect_wait_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no session could work with
    pub fn validate(&self) -> Result<()> {
        if self.session.power_on_timeout_ms == 0 {
            return Err(CliError::Config(
                "session.power_on_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.session.connection_timeout_ms == 0 {
            return Err(CliError::Config(
                "session.connection_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.session.event_buffer_size == 0 {
            return Err(CliError::Config(
                "session.event_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.flow.scan_timeout_secs == 0 {
            return Err(CliError::Config(
                "flow.scan_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if matches!(&self.flow.device_name, Some(name) if name.trim().is_empty()) {
            return Err(CliError::Config(
                "flow.device_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new()
            .with_power_on_timeout(Duration::from_millis(self.session.power_on_timeout_ms))
            .with_connection_timeout(Duration::from_millis(self.session.connection_timeout_ms))
            .with_event_buffer_size(self.session.event_buffer_size)
    }

    pub fn radio_config(&self) -> BtleplugConfig {
        BtleplugConfig::new()
            .with_adapter_index(self.radio.adapter_index)
            .with_disconnect_buffer_size(self.radio.disconnect_buffer_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.session_config(), SessionConfig::default());
        assert_eq!(config.radio_config(), BtleplugConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
            [session]
            connection_timeout_ms = 2500

            [flow]
            device_name = "nRF Time Probe"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.session_config().connection_timeout,
            Duration::from_millis(2500)
        );
        assert_eq!(config.session.power_on_timeout_ms, 5000);
        assert_eq!(config.flow.device_name.as_deref(), Some("nRF Time Probe"));
        assert_eq!(config.flow.disconnect_wait_secs, 30);
    }

    #[test]
    fn test_validation_rejects_zero_timeouts() {
        let result = AppConfig::from_toml("[session]\npower_on_timeout_ms = 0\n");
        assert!(matches!(result, Err(CliError::Config(_))));

        let result = AppConfig::from_toml("[flow]\nscan_timeout_secs = 0\n");
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = AppConfig::from_toml("[session\n");
        assert!(matches!(result, Err(CliError::TomlParsing(_))));
    }
}
