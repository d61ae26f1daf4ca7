//! Scripted in-memory radio
//!
//! [`MockRadioAdapter`] stands in for a platform radio in tests and in the
//! CLI's `--simulate` mode. Devices are declared up front with their raw
//! advertisement records and GATT contents; failures, delays and
//! unsolicited disconnects are injected through the async control methods.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{broadcast, mpsc, Mutex, Notify};
use tracing::debug;

use crate::adapter::{Advertisement, RadioAdapter};
use crate::advertisement::AdvertisementData;
use crate::codec::TimePayload;
use crate::errors::AdapterError;
use crate::gatt::{self, GattTable};
use crate::types::{CharacteristicAddress, DeviceId, DisconnectEvent, ScanFilter};

/// Identifier of the device created by [`MockRadioAdapter::with_sample_device`]
pub const SAMPLE_DEVICE_ID: &str = "C0:FF:EE:00:00:01";

/// Advertised name of the sample device
pub const SAMPLE_DEVICE_NAME: &str = "nRF Time Probe";

// ----------------------------------------------------------------------------
// Mock Device
// ----------------------------------------------------------------------------

/// A simulated peripheral
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub id: DeviceId,
    pub rssi: Option<i16>,
    /// Raw advertisement record
    pub advertisement: Vec<u8>,
    /// Only visible to scans that include extended advertising
    pub extended_only: bool,
    pub gatt: GattTable,
    /// Descriptor values served on read and replaced on write
    pub values: BTreeMap<CharacteristicAddress, Vec<u8>>,
}

impl MockDevice {
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            rssi: None,
            advertisement: Vec::new(),
            extended_only: false,
            gatt: GattTable::new(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    pub fn with_advertisement(mut self, record: Vec<u8>) -> Self {
        self.advertisement = record;
        self
    }

    pub fn with_extended_only(mut self, extended_only: bool) -> Self {
        self.extended_only = extended_only;
        self
    }

    /// Declare a descriptor with its initial value
    pub fn with_descriptor(mut self, address: CharacteristicAddress, value: Vec<u8>) -> Self {
        self.gatt.insert(address);
        self.values.insert(address, value);
        self
    }

    fn advertisement(&self) -> Advertisement {
        Advertisement {
            device: self.id.clone(),
            rssi: self.rssi,
            data: AdvertisementData::parse(&self.advertisement),
        }
    }
}

/// Advertisement record with a complete local name and 16-bit service UUIDs
pub fn advertisement_record(name: &str, services: &[u16]) -> Vec<u8> {
    let mut record = vec![0x02, 0x01, 0x06];

    if !services.is_empty() {
        record.push((services.len() * 2 + 1) as u8);
        record.push(0x03);
        for service in services {
            record.extend_from_slice(&service.to_le_bytes());
        }
    }

    let name = name.as_bytes();
    record.push((name.len() + 1) as u8);
    record.push(0x09);
    record.extend_from_slice(name);
    record
}

// ----------------------------------------------------------------------------
// Mock Radio Adapter
// ----------------------------------------------------------------------------

#[derive(Default)]
struct MockState {
    radio_absent: bool,
    devices: BTreeMap<DeviceId, MockDevice>,
    connected: HashSet<DeviceId>,
    scan_sink: Option<mpsc::UnboundedSender<Advertisement>>,
    scan_filter: ScanFilter,
    connect_delay: Option<Duration>,
    auto_disconnect_after: Option<Duration>,
    fail_connect: Option<AdapterError>,
    fail_disconnect: Option<AdapterError>,
    /// Reason reported when the next connect loses its link before returning
    drop_during_connect: Option<String>,
    fail_discover: Option<AdapterError>,
    fail_read: Option<AdapterError>,
    fail_write: Option<AdapterError>,
    discovery_gate: Option<Arc<Notify>>,
    writes: Vec<(DeviceId, CharacteristicAddress, Vec<u8>)>,
    scans_started: usize,
}

struct MockInner {
    state: Mutex<MockState>,
    disconnects: broadcast::Sender<DisconnectEvent>,
}

impl MockInner {
    async fn drop_connection(&self, device: &DeviceId, reason: Option<String>) -> bool {
        let was_connected = self.state.lock().await.connected.remove(device);
        if was_connected {
            let _ = self
                .disconnects
                .send(DisconnectEvent::new(device.clone(), reason));
        }
        was_connected
    }
}

/// In-memory [`RadioAdapter`]
#[derive(Clone)]
pub struct MockRadioAdapter {
    inner: Arc<MockInner>,
}

impl Default for MockRadioAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a [`MockRadioAdapter`]
#[derive(Default)]
pub struct MockRadioBuilder {
    state: MockState,
}

impl MockRadioBuilder {
    pub fn with_device(mut self, device: MockDevice) -> Self {
        self.state.devices.insert(device.id.clone(), device);
        self
    }

    /// Simulate a host without a usable radio
    pub fn with_radio_absent(mut self) -> Self {
        self.state.radio_absent = true;
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.state.connect_delay = Some(delay);
        self
    }

    /// Drop every link this long after it is established
    pub fn with_auto_disconnect_after(mut self, delay: Duration) -> Self {
        self.state.auto_disconnect_after = Some(delay);
        self
    }

    pub fn build(self) -> MockRadioAdapter {
        let (disconnects, _) = broadcast::channel(16);
        MockRadioAdapter {
            inner: Arc::new(MockInner {
                state: Mutex::new(self.state),
                disconnects,
            }),
        }
    }
}

impl MockRadioAdapter {
    /// A radio with no devices
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MockRadioBuilder {
        MockRadioBuilder::default()
    }

    /// A radio with one device exposing the current time descriptor
    ///
    /// The descriptor initially holds 2024-05-10 14:30:05.
    pub fn with_sample_device() -> Self {
        Self::builder().with_device(sample_device()).build()
    }

    pub async fn fail_next_connect(&self, error: AdapterError) {
        self.inner.state.lock().await.fail_connect = Some(error);
    }

    pub async fn fail_next_disconnect(&self, error: AdapterError) {
        self.inner.state.lock().await.fail_disconnect = Some(error);
    }

    /// Drop the link of the next connect before that connect returns
    pub async fn drop_link_during_next_connect(&self, reason: &str) {
        self.inner.state.lock().await.drop_during_connect = Some(reason.to_string());
    }

    pub async fn fail_next_discover(&self, error: AdapterError) {
        self.inner.state.lock().await.fail_discover = Some(error);
    }

    pub async fn fail_next_read(&self, error: AdapterError) {
        self.inner.state.lock().await.fail_read = Some(error);
    }

    pub async fn fail_next_write(&self, error: AdapterError) {
        self.inner.state.lock().await.fail_write = Some(error);
    }

    /// Hold the next discovery until the returned handle is notified
    pub async fn gate_discovery(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.inner.state.lock().await.discovery_gate = Some(Arc::clone(&gate));
        gate
    }

    /// Drop the link to `device` as the remote side or the radio would
    ///
    /// Returns false when the device was not connected.
    pub async fn trigger_disconnect(&self, device: &DeviceId, reason: Option<&str>) -> bool {
        self.inner
            .drop_connection(device, reason.map(str::to_string))
            .await
    }

    /// Re-send the advertisement of `device` to the active scan
    pub async fn advertise(&self, device: &DeviceId) -> bool {
        let state = self.inner.state.lock().await;
        match (&state.scan_sink, state.devices.get(device)) {
            (Some(sink), Some(device)) if visible(device, &state.scan_filter) => {
                sink.send(device.advertisement()).is_ok()
            }
            _ => false,
        }
    }

    pub async fn is_connected(&self, device: &DeviceId) -> bool {
        self.inner.state.lock().await.connected.contains(device)
    }

    pub async fn is_scanning(&self) -> bool {
        self.inner.state.lock().await.scan_sink.is_some()
    }

    pub async fn scans_started(&self) -> usize {
        self.inner.state.lock().await.scans_started
    }

    /// Every descriptor write accepted so far
    pub async fn writes(&self) -> Vec<(DeviceId, CharacteristicAddress, Vec<u8>)> {
        self.inner.state.lock().await.writes.clone()
    }

    pub async fn descriptor_value(
        &self,
        device: &DeviceId,
        address: &CharacteristicAddress,
    ) -> Option<Vec<u8>> {
        let state = self.inner.state.lock().await;
        state.devices.get(device)?.values.get(address).cloned()
    }
}

fn visible(device: &MockDevice, filter: &ScanFilter) -> bool {
    filter.legacy || !device.extended_only
}

/// The device behind [`MockRadioAdapter::with_sample_device`]
pub fn sample_device() -> MockDevice {
    let payload = NaiveDate::from_ymd_opt(2024, 5, 10)
        .and_then(|date| date.and_hms_opt(14, 30, 5))
        .and_then(|datetime| TimePayload::from_datetime(&datetime).ok())
        .map(|payload| payload.to_bytes().to_vec())
        .unwrap_or_default();

    MockDevice::new(SAMPLE_DEVICE_ID)
        .with_rssi(-58)
        .with_advertisement(advertisement_record(SAMPLE_DEVICE_NAME, &[0x1847]))
        .with_descriptor(gatt::current_time_descriptor(), payload)
}

#[async_trait]
impl RadioAdapter for MockRadioAdapter {
    async fn power_on(&self) -> Result<(), AdapterError> {
        if self.inner.state.lock().await.radio_absent {
            return Err(AdapterError::Unavailable("no Bluetooth adapter found".to_string()));
        }
        Ok(())
    }

    async fn start_scan(
        &self,
        filter: &ScanFilter,
    ) -> Result<mpsc::UnboundedReceiver<Advertisement>, AdapterError> {
        let mut state = self.inner.state.lock().await;
        if state.radio_absent {
            return Err(AdapterError::PoweredOff);
        }

        let (sink, advertisements) = mpsc::unbounded_channel();
        for device in state.devices.values() {
            if visible(device, filter) {
                let _ = sink.send(device.advertisement());
            }
        }
        state.scan_sink = Some(sink);
        state.scan_filter = filter.clone();
        state.scans_started += 1;
        debug!("Mock scan started");
        Ok(advertisements)
    }

    async fn stop_scan(&self) -> Result<(), AdapterError> {
        self.inner.state.lock().await.scan_sink = None;
        Ok(())
    }

    async fn connect(&self, device: &DeviceId) -> Result<(), AdapterError> {
        let delay = {
            let mut state = self.inner.state.lock().await;
            if !state.devices.contains_key(device) {
                return Err(AdapterError::DeviceNotFound {
                    device: device.clone(),
                });
            }
            if let Some(error) = state.fail_connect.take() {
                return Err(error);
            }
            state.connect_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (auto_disconnect, dropped) = {
            let mut state = self.inner.state.lock().await;
            state.connected.insert(device.clone());
            (state.auto_disconnect_after, state.drop_during_connect.take())
        };

        if let Some(reason) = dropped {
            self.inner.drop_connection(device, Some(reason)).await;
            // Let the report land before the connect resolves
            tokio::time::sleep(Duration::from_millis(20)).await;
            return Ok(());
        }

        if let Some(after) = auto_disconnect {
            let inner = Arc::clone(&self.inner);
            let device = device.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                inner
                    .drop_connection(&device, Some("connection supervision timeout".to_string()))
                    .await;
            });
        }
        Ok(())
    }

    async fn disconnect(&self, device: &DeviceId) -> Result<(), AdapterError> {
        if let Some(error) = self.inner.state.lock().await.fail_disconnect.take() {
            return Err(error);
        }
        self.inner.drop_connection(device, None).await;
        Ok(())
    }

    async fn discover(&self, device: &DeviceId) -> Result<GattTable, AdapterError> {
        let gate = self.inner.state.lock().await.discovery_gate.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.inner.state.lock().await;
        if !state.connected.contains(device) {
            return Err(AdapterError::NotConnected);
        }
        if let Some(error) = state.fail_discover.take() {
            return Err(error);
        }
        state
            .devices
            .get(device)
            .map(|device| device.gatt.clone())
            .ok_or_else(|| AdapterError::DeviceNotFound {
                device: device.clone(),
            })
    }

    async fn read_descriptor(
        &self,
        device: &DeviceId,
        address: &CharacteristicAddress,
    ) -> Result<Vec<u8>, AdapterError> {
        let mut state = self.inner.state.lock().await;
        if !state.connected.contains(device) {
            return Err(AdapterError::NotConnected);
        }
        if let Some(error) = state.fail_read.take() {
            return Err(error);
        }
        state
            .devices
            .get(device)
            .and_then(|device| device.values.get(address))
            .cloned()
            .ok_or_else(|| AdapterError::AttributeNotFound(address.to_string()))
    }

    async fn write_descriptor(
        &self,
        device: &DeviceId,
        address: &CharacteristicAddress,
        value: &[u8],
    ) -> Result<(), AdapterError> {
        let mut state = self.inner.state.lock().await;
        if !state.connected.contains(device) {
            return Err(AdapterError::NotConnected);
        }
        if let Some(error) = state.fail_write.take() {
            return Err(error);
        }
        let slot = state
            .devices
            .get_mut(device)
            .and_then(|device| device.values.get_mut(address))
            .ok_or_else(|| AdapterError::AttributeNotFound(address.to_string()))?;
        *slot = value.to_vec();
        state.writes.push((device.clone(), *address, value.to_vec()));
        Ok(())
    }

    fn disconnect_events(&self) -> broadcast::Receiver<DisconnectEvent> {
        self.inner.disconnects.subscribe()
    }
}
