//! The radio primitive seam
//!
//! A [`RadioAdapter`] is the platform BLE capability the session manager
//! orchestrates. It performs one radio operation per call and keeps no
//! session state of its own beyond what the platform requires; the
//! session manager layers state tracking and de-duplication on top.

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::advertisement::AdvertisementData;
use crate::errors::AdapterError;
use crate::gatt::GattTable;
use crate::types::{CharacteristicAddress, DeviceId, DeviceRecord, DisconnectEvent, ScanFilter};

/// One advertisement observed by the radio
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub device: DeviceId,
    pub rssi: Option<i16>,
    pub data: AdvertisementData,
}

impl From<Advertisement> for DeviceRecord {
    fn from(advertisement: Advertisement) -> Self {
        DeviceRecord {
            id: advertisement.device,
            advertised_name: advertisement.data.local_name.clone(),
            rssi: advertisement.rssi,
            advertisement: advertisement.data,
        }
    }
}

/// Platform BLE primitives consumed by the session manager
#[async_trait]
pub trait RadioAdapter: Send + Sync + 'static {
    /// Power the radio on and confirm it is ready
    async fn power_on(&self) -> Result<(), AdapterError>;

    /// Start scanning; advertisements arrive on the returned channel until
    /// [`RadioAdapter::stop_scan`] is called
    async fn start_scan(
        &self,
        filter: &ScanFilter,
    ) -> Result<mpsc::UnboundedReceiver<Advertisement>, AdapterError>;

    async fn stop_scan(&self) -> Result<(), AdapterError>;

    async fn connect(&self, device: &DeviceId) -> Result<(), AdapterError>;

    async fn disconnect(&self, device: &DeviceId) -> Result<(), AdapterError>;

    /// Discover all services, characteristics and descriptors of a connected device
    async fn discover(&self, device: &DeviceId) -> Result<GattTable, AdapterError>;

    async fn read_descriptor(
        &self,
        device: &DeviceId,
        address: &CharacteristicAddress,
    ) -> Result<Vec<u8>, AdapterError>;

    async fn write_descriptor(
        &self,
        device: &DeviceId,
        address: &CharacteristicAddress,
        value: &[u8],
    ) -> Result<(), AdapterError>;

    /// Subscribe to disconnects reported by the radio, solicited or not
    fn disconnect_events(&self) -> broadcast::Receiver<DisconnectEvent>;
}
