//! [`RadioAdapter`] implementation on top of btleplug's central role
//!
//! btleplug exposes one event stream per host adapter. A pump task started
//! at power-on drains it: advertisements are forwarded to the active scan
//! and disconnects are rebroadcast as [`DisconnectEvent`]s. Peripherals seen
//! while scanning are cached by [`DeviceId`] so later connect and I/O calls
//! can find them.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bleprobe_core::{
    AdapterError, Advertisement, CharacteristicAddress, DeviceId, DisconnectEvent, GattTable,
    RadioAdapter, ScanFilter,
};
use btleplug::api::{
    Central, CentralEvent, Descriptor, Manager as _, Peripheral as _,
    ScanFilter as PlatformScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BtleplugConfig;
use crate::error::{BleError, BleResult};
use crate::properties::{advertisement_from_properties, gatt_table_from_services};

fn device_id(id: &PeripheralId) -> DeviceId {
    DeviceId::new(id.to_string())
}

// ----------------------------------------------------------------------------
// Shared Adapter State
// ----------------------------------------------------------------------------

struct Inner {
    config: BtleplugConfig,
    central: RwLock<Option<Adapter>>,
    peripherals: RwLock<HashMap<DeviceId, Peripheral>>,
    scan_sink: Mutex<Option<mpsc::UnboundedSender<Advertisement>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    disconnects: broadcast::Sender<DisconnectEvent>,
}

impl Inner {
    async fn central(&self) -> BleResult<Adapter> {
        self.central
            .read()
            .await
            .clone()
            .ok_or(BleError::NotInitialized)
    }

    async fn open_central(&self) -> BleResult<Adapter> {
        let manager = Manager::new()
            .await
            .map_err(|e| BleError::ManagerUnavailable(e.to_string()))?;

        let adapters = manager.adapters().await?;
        let available = adapters.len();
        let index = self.config.adapter_index;
        let central = adapters
            .into_iter()
            .nth(index)
            .ok_or(BleError::AdapterNotFound { index, available })?;

        let info = central.adapter_info().await?;
        info!("Using BLE adapter {}", info);
        Ok(central)
    }

    async fn peripheral(&self, device: &DeviceId) -> BleResult<Peripheral> {
        if let Some(peripheral) = self.peripherals.read().await.get(device) {
            return Ok(peripheral.clone());
        }

        // The platform may know devices this process never saw advertise
        let central = self.central().await?;
        for peripheral in central.peripherals().await? {
            let id = device_id(&peripheral.id());
            if &id == device {
                self.peripherals
                    .write()
                    .await
                    .insert(id, peripheral.clone());
                return Ok(peripheral);
            }
        }

        Err(BleError::PeripheralNotFound {
            device: device.clone(),
        })
    }

    async fn descriptor(
        &self,
        device: &DeviceId,
        address: &CharacteristicAddress,
    ) -> BleResult<(Peripheral, Descriptor)> {
        let peripheral = self.peripheral(device).await?;
        let descriptor = peripheral
            .characteristics()
            .iter()
            .filter(|c| c.service_uuid == address.service && c.uuid == address.characteristic)
            .flat_map(|c| c.descriptors.iter())
            .find(|d| d.uuid == address.descriptor)
            .cloned()
            .ok_or_else(|| BleError::DescriptorNotFound(address.to_string()))?;
        Ok((peripheral, descriptor))
    }

    async fn handle_event(&self, event: CentralEvent) {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                if let Err(e) = self.forward_advertisement(&id).await {
                    debug!("Dropped advertisement from {}: {}", device_id(&id), e);
                }
            }
            CentralEvent::DeviceDisconnected(id) => {
                let device = device_id(&id);
                debug!("Peripheral {} disconnected", device);
                // No session listening yet is fine
                let _ = self.disconnects.send(DisconnectEvent::new(device, None));
            }
            _ => {}
        }
    }

    async fn forward_advertisement(&self, id: &PeripheralId) -> BleResult<()> {
        let Some(sink) = self.scan_sink.lock().await.clone() else {
            return Ok(());
        };

        let peripheral = self.central().await?.peripheral(id).await?;
        let Some(properties) = peripheral.properties().await? else {
            return Ok(());
        };

        let device = device_id(id);
        self.peripherals
            .write()
            .await
            .insert(device.clone(), peripheral);

        let _ = sink.send(Advertisement {
            device,
            rssi: properties.rssi,
            data: advertisement_from_properties(&properties),
        });
        Ok(())
    }

    async fn start_scan(
        &self,
        filter: &ScanFilter,
    ) -> BleResult<mpsc::UnboundedReceiver<Advertisement>> {
        let central = self.central().await?;
        if !filter.legacy {
            debug!("Extended advertising requested; btleplug scans with platform defaults");
        }

        let (sink, advertisements) = mpsc::unbounded_channel();
        *self.scan_sink.lock().await = Some(sink);

        let platform_filter = PlatformScanFilter {
            services: filter.services.clone(),
        };
        if let Err(e) = central.start_scan(platform_filter).await {
            *self.scan_sink.lock().await = None;
            return Err(e.into());
        }
        Ok(advertisements)
    }

    async fn stop_scan(&self) -> BleResult<()> {
        *self.scan_sink.lock().await = None;
        self.central().await?.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, device: &DeviceId) -> BleResult<()> {
        let peripheral = self.peripheral(device).await?;
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        Ok(())
    }

    async fn disconnect(&self, device: &DeviceId) -> BleResult<()> {
        self.peripheral(device).await?.disconnect().await?;
        Ok(())
    }

    async fn discover(&self, device: &DeviceId) -> BleResult<GattTable> {
        let peripheral = self.peripheral(device).await?;
        peripheral.discover_services().await?;
        Ok(gatt_table_from_services(&peripheral.services()))
    }
}

// ----------------------------------------------------------------------------
// btleplug Adapter
// ----------------------------------------------------------------------------

/// Host BLE radio driven through btleplug
pub struct BtleplugAdapter {
    inner: Arc<Inner>,
}

impl Default for BtleplugAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl BtleplugAdapter {
    /// Create an adapter for the first host radio
    pub fn new() -> Self {
        Self::with_config(BtleplugConfig::default())
    }

    pub fn with_config(config: BtleplugConfig) -> Self {
        let (disconnects, _) = broadcast::channel(config.disconnect_buffer_size.max(1));
        Self {
            inner: Arc::new(Inner {
                config,
                central: RwLock::new(None),
                peripherals: RwLock::new(HashMap::new()),
                scan_sink: Mutex::new(None),
                pump: Mutex::new(None),
                disconnects,
            }),
        }
    }

    pub fn config(&self) -> &BtleplugConfig {
        &self.inner.config
    }

    /// Number of peripherals cached from scans and lookups
    pub async fn known_peripherals(&self) -> usize {
        self.inner.peripherals.read().await.len()
    }

    async fn start_pump(&self, central: &Adapter) -> BleResult<()> {
        let mut events = central
            .events()
            .await
            .map_err(|e| BleError::EventStreamFailed(e.to_string()))?;

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let pump = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.handle_event(event).await;
            }
            debug!("BLE event stream ended");
        });

        if let Some(previous) = self.inner.pump.lock().await.replace(pump) {
            previous.abort();
        }
        Ok(())
    }
}

#[async_trait]
impl RadioAdapter for BtleplugAdapter {
    async fn power_on(&self) -> Result<(), AdapterError> {
        let mut central = self.inner.central.write().await;
        if central.is_some() {
            return Ok(());
        }

        let opened = self.inner.open_central().await?;
        self.start_pump(&opened).await?;
        *central = Some(opened);
        Ok(())
    }

    async fn start_scan(
        &self,
        filter: &ScanFilter,
    ) -> Result<mpsc::UnboundedReceiver<Advertisement>, AdapterError> {
        Ok(self.inner.start_scan(filter).await?)
    }

    async fn stop_scan(&self) -> Result<(), AdapterError> {
        Ok(self.inner.stop_scan().await?)
    }

    async fn connect(&self, device: &DeviceId) -> Result<(), AdapterError> {
        Ok(self.inner.connect(device).await?)
    }

    async fn disconnect(&self, device: &DeviceId) -> Result<(), AdapterError> {
        Ok(self.inner.disconnect(device).await?)
    }

    async fn discover(&self, device: &DeviceId) -> Result<GattTable, AdapterError> {
        Ok(self.inner.discover(device).await?)
    }

    async fn read_descriptor(
        &self,
        device: &DeviceId,
        address: &CharacteristicAddress,
    ) -> Result<Vec<u8>, AdapterError> {
        let (peripheral, descriptor) = self.inner.descriptor(device, address).await?;
        peripheral
            .read_descriptor(&descriptor)
            .await
            .map_err(|e| BleError::from(e).into())
    }

    async fn write_descriptor(
        &self,
        device: &DeviceId,
        address: &CharacteristicAddress,
        value: &[u8],
    ) -> Result<(), AdapterError> {
        let (peripheral, descriptor) = self.inner.descriptor(device, address).await?;
        peripheral
            .write_descriptor(&descriptor, value)
            .await
            .map_err(|e| BleError::from(e).into())
    }

    fn disconnect_events(&self) -> broadcast::Receiver<DisconnectEvent> {
        self.inner.disconnects.subscribe()
    }
}

impl Drop for BtleplugAdapter {
    fn drop(&mut self) {
        match self.inner.pump.try_lock() {
            Ok(mut pump) => {
                if let Some(pump) = pump.take() {
                    pump.abort();
                }
            }
            Err(_) => warn!("BLE event pump still running at adapter drop"),
        }
    }
}
