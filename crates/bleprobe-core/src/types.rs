//! Shared data model for BLE sessions

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::advertisement::AdvertisementData;

// ----------------------------------------------------------------------------
// Device Identity
// ----------------------------------------------------------------------------

/// Opaque identifier of a discovered or connected peripheral
///
/// The value is whatever the platform radio uses (a MAC address on Linux and
/// Android, a UUID on Apple platforms). It is stable for one physical device
/// for the lifetime of a scan/connect session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device identifier from the platform representation
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Platform representation of the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A device observed during a scan
///
/// Records are produced fresh for every matching advertisement and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub advertised_name: Option<String>,
    pub rssi: Option<i16>,
    pub advertisement: AdvertisementData,
}

impl DeviceRecord {
    /// Case-insensitive comparison of the advertised name
    pub fn name_matches(&self, expected: &str) -> bool {
        self.advertised_name
            .as_deref()
            .map(|name| name.to_lowercase() == expected.to_lowercase())
            .unwrap_or(false)
    }
}

// ----------------------------------------------------------------------------
// Scan Filter
// ----------------------------------------------------------------------------

/// Restricts which advertisements a scan reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFilter {
    /// Service UUIDs of interest; empty matches every advertisement
    pub services: Vec<Uuid>,
    /// Scan with legacy advertising PDUs only (false enables extended advertising)
    pub legacy: bool,
}

impl Default for ScanFilter {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            legacy: true,
        }
    }
}

impl ScanFilter {
    /// Create a filter matching every legacy advertisement
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service UUID to the filter
    pub fn with_service(mut self, service: Uuid) -> Self {
        if !self.services.contains(&service) {
            self.services.push(service);
        }
        self
    }

    /// Select legacy (true) or extended (false) advertisement scanning
    pub fn with_legacy(mut self, legacy: bool) -> Self {
        self.legacy = legacy;
        self
    }

    /// Check whether an advertisement carries one of the filtered services
    pub fn matches(&self, advertisement: &AdvertisementData) -> bool {
        self.services.is_empty()
            || self
                .services
                .iter()
                .any(|service| advertisement.advertises(service))
    }
}

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Lifecycle state of the BLE session
///
/// Exactly one state holds at a time. It is the value a presentation layer
/// uses to gate user actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Scanning,
    Connecting,
    Connected,
    Discovering,
    Ready,
    Disconnected,
    Error,
}

impl SessionState {
    /// State name for logging and readouts
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "UNINITIALIZED",
            SessionState::Initializing => "INITIALIZING",
            SessionState::Scanning => "SCANNING",
            SessionState::Connecting => "CONNECTING",
            SessionState::Connected => "CONNECTED",
            SessionState::Discovering => "DISCOVERING",
            SessionState::Ready => "READY",
            SessionState::Disconnected => "DISCONNECTED",
            SessionState::Error => "ERROR",
        }
    }

    /// True while a link to the active device is up
    pub fn has_link(&self) -> bool {
        matches!(
            self,
            SessionState::Connected | SessionState::Discovering | SessionState::Ready
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ----------------------------------------------------------------------------
// GATT Addressing
// ----------------------------------------------------------------------------

/// Path to one descriptor in a discovered GATT table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacteristicAddress {
    pub service: Uuid,
    pub characteristic: Uuid,
    pub descriptor: Uuid,
}

impl CharacteristicAddress {
    pub fn new(service: Uuid, characteristic: Uuid, descriptor: Uuid) -> Self {
        Self {
            service,
            characteristic,
            descriptor,
        }
    }
}

impl fmt::Display for CharacteristicAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.service, self.characteristic, self.descriptor
        )
    }
}

// ----------------------------------------------------------------------------
// Disconnect Events
// ----------------------------------------------------------------------------

/// A disconnect reported by the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectEvent {
    pub device: DeviceId,
    /// Error detail supplied by the radio, if any
    pub reason: Option<String>,
}

impl DisconnectEvent {
    pub fn new(device: DeviceId, reason: Option<String>) -> Self {
        Self { device, reason }
    }
}
