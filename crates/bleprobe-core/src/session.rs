//! BLE session manager
//!
//! [`SessionManager`] wraps a [`RadioAdapter`] with a single
//! [`SessionState`] machine for one active device. Mutating operations
//! (scan, connect, discover) are rejected while a conflicting operation is
//! in flight rather than queued: the state lock is never held across a
//! connect, discovery or descriptor round trip, so a second caller observes
//! the in-flight state and fails fast.
//!
//! Disconnects reported by the radio are dispatched from one background
//! task into [`SessionManager`]'s disconnect handling, which updates the
//! state, clears the discovered GATT table and invokes the listener
//! registered for the device.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::adapter::RadioAdapter;
use crate::config::SessionConfig;
use crate::errors::{SessionError, SessionResult};
use crate::gatt::GattTable;
use crate::notifier::DisconnectNotifier;
use crate::types::{
    CharacteristicAddress, DeviceId, DeviceRecord, DisconnectEvent, ScanFilter, SessionState,
};

// ----------------------------------------------------------------------------
// Session Events
// ----------------------------------------------------------------------------

/// Observable session activity for presentation layers
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    DeviceFound(DeviceRecord),
    Disconnected(DisconnectEvent),
}

// ----------------------------------------------------------------------------
// Internal State
// ----------------------------------------------------------------------------

struct ActiveScan {
    /// State to restore when the scan stops
    resume_state: SessionState,
    task: JoinHandle<()>,
}

struct SessionInner {
    state: SessionState,
    initialized: bool,
    active: Option<DeviceId>,
    /// Present only after a discovery completed on the current link
    gatt: Option<GattTable>,
    scan: Option<ActiveScan>,
    /// Bumped whenever the active link goes away; in-flight discoveries
    /// compare it to drop results for a link that no longer exists
    link_epoch: u64,
    /// Devices we disconnected ourselves whose radio report is still pending
    solicited: HashSet<DeviceId>,
    /// Target of the connect in flight
    connecting: Option<DeviceId>,
    /// Set when the radio reports the connect target gone before the connect resolves
    connect_lost: bool,
    dispatch: Option<JoinHandle<()>>,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            initialized: false,
            active: None,
            gatt: None,
            scan: None,
            link_epoch: 0,
            solicited: HashSet::new(),
            connecting: None,
            connect_lost: false,
            dispatch: None,
        }
    }

    /// State the session is in once an active scan stops
    fn settled_state(&self) -> SessionState {
        self.scan
            .as_ref()
            .map(|scan| scan.resume_state)
            .unwrap_or(self.state)
    }
}

struct Shared<A> {
    adapter: Arc<A>,
    config: SessionConfig,
    inner: RwLock<SessionInner>,
    notifier: DisconnectNotifier,
    events: broadcast::Sender<SessionEvent>,
}

impl<A: RadioAdapter> Shared<A> {
    fn transition(&self, inner: &mut SessionInner, next: SessionState) {
        if inner.state == next {
            return;
        }
        let previous = std::mem::replace(&mut inner.state, next);
        debug!("Session state {} -> {}", previous, next);
        // No subscribers is fine
        let _ = self.events.send(SessionEvent::StateChanged {
            from: previous,
            to: next,
        });
    }

    /// Move to `next`, or record it as the post-scan state while a scan is active
    fn settle(&self, inner: &mut SessionInner, next: SessionState) {
        if let Some(scan) = inner.scan.as_mut() {
            scan.resume_state = next;
            return;
        }
        self.transition(inner, next);
    }

    /// Tear down the active link without touching the radio
    fn drop_link(&self, inner: &mut SessionInner) -> Option<DeviceId> {
        let device = inner.active.take();
        inner.gatt = None;
        inner.link_epoch += 1;
        self.settle(inner, SessionState::Disconnected);
        device
    }

    async fn stop_scan_locked(&self, inner: &mut SessionInner) -> SessionResult<()> {
        let Some(scan) = inner.scan.take() else {
            return Ok(());
        };
        scan.task.abort();
        let result = self.adapter.stop_scan().await;
        self.transition(inner, scan.resume_state);

        match result {
            Ok(()) => {
                info!("Stopped BLE scan");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to stop BLE scan cleanly: {}", e);
                Err(SessionError::ScanFailed(e.to_string()))
            }
        }
    }

    /// Single dispatch point for radio-reported disconnects
    async fn handle_disconnect(&self, event: DisconnectEvent) {
        {
            let mut inner = self.inner.write().await;
            if inner.solicited.remove(&event.device) {
                debug!("Radio confirmed disconnect from {}", event.device);
            } else if inner.active.as_ref() == Some(&event.device) {
                self.drop_link(&mut inner);
                match &event.reason {
                    Some(reason) => info!("Device {} disconnected: {}", event.device, reason),
                    None => info!("Device {} disconnected", event.device),
                }
            } else if inner.connecting.as_ref() == Some(&event.device) {
                inner.connect_lost = true;
                info!("Device {} dropped the link while connecting", event.device);
            } else {
                debug!("Disconnect reported for inactive device {}", event.device);
            }
        }

        if !self.notifier.notify(&event) {
            debug!("No disconnect listener registered for {}", event.device);
        }
        let _ = self.events.send(SessionEvent::Disconnected(event));
    }
}

fn spawn_dispatch<A: RadioAdapter>(shared: &Arc<Shared<A>>) -> JoinHandle<()> {
    let mut disconnects = shared.adapter.disconnect_events();
    let shared: Weak<Shared<A>> = Arc::downgrade(shared);

    tokio::spawn(async move {
        loop {
            match disconnects.recv().await {
                Ok(event) => {
                    let Some(shared) = shared.upgrade() else {
                        break;
                    };
                    shared.handle_disconnect(event).await;
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Missed {} disconnect events", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Disconnect dispatch ended");
    })
}

// ----------------------------------------------------------------------------
// Session Manager
// ----------------------------------------------------------------------------

/// Owner of the BLE session lifecycle for one active device
pub struct SessionManager<A: RadioAdapter> {
    shared: Arc<Shared<A>>,
}

impl<A: RadioAdapter> SessionManager<A> {
    /// Create a session manager with default configuration
    pub fn new(adapter: Arc<A>) -> Self {
        Self::with_config(adapter, SessionConfig::default())
    }

    /// Create a session manager with custom configuration
    pub fn with_config(adapter: Arc<A>, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer_size.max(1));
        Self {
            shared: Arc::new(Shared {
                adapter,
                config,
                inner: RwLock::new(SessionInner::new()),
                notifier: DisconnectNotifier::new(),
                events,
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.shared.adapter
    }

    /// Current session state
    pub async fn state(&self) -> SessionState {
        self.shared.inner.read().await.state
    }

    /// Device the session is connected to, if any
    pub async fn active_device(&self) -> Option<DeviceId> {
        self.shared.inner.read().await.active.clone()
    }

    /// GATT table from the last completed discovery on the current link
    pub async fn gatt_table(&self) -> Option<GattTable> {
        self.shared.inner.read().await.gatt.clone()
    }

    /// Subscribe to state changes, scan matches and disconnects
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Power on the radio
    ///
    /// Idempotent: once initialized, further calls succeed without touching
    /// the radio. A failed initialization leaves the session in `Error`, from
    /// which it can be retried.
    pub async fn initialize(&self) -> SessionResult<()> {
        let shared = &self.shared;
        {
            let mut inner = shared.inner.write().await;
            if inner.initialized {
                debug!("BLE session already initialized");
                return Ok(());
            }
            if inner.state == SessionState::Initializing {
                return Err(SessionError::InitializationInProgress);
            }
            shared.transition(&mut inner, SessionState::Initializing);
        }

        let result = timeout(shared.config.power_on_timeout, shared.adapter.power_on()).await;

        let mut inner = shared.inner.write().await;
        let reason = match result {
            Ok(Ok(())) => {
                inner.initialized = true;
                if inner.dispatch.is_none() {
                    inner.dispatch = Some(spawn_dispatch(shared));
                }
                shared.transition(&mut inner, SessionState::Disconnected);
                info!("BLE session initialized");
                return Ok(());
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "radio did not power on within {:?}",
                shared.config.power_on_timeout
            ),
        };

        error!("BLE adapter unavailable: {}", reason);
        shared.transition(&mut inner, SessionState::Error);
        Err(SessionError::AdapterUnavailable(reason))
    }

    /// Start a continuous scan
    ///
    /// `on_match` runs for every advertisement carrying one of the filter's
    /// services, possibly many times per device. The scan runs until
    /// [`SessionManager::stop_scan`] or a connect stops it.
    pub async fn scan<F>(&self, filter: ScanFilter, on_match: F) -> SessionResult<()>
    where
        F: Fn(DeviceRecord) + Send + Sync + 'static,
    {
        let shared = &self.shared;
        // Starting a scan is a local radio call; holding the lock across it
        // makes a racing scan observe this one.
        let mut inner = shared.inner.write().await;
        if !inner.initialized {
            return Err(SessionError::NotInitialized);
        }
        if inner.scan.is_some() {
            return Err(SessionError::ScanAlreadyActive);
        }
        match inner.state {
            SessionState::Connecting => return Err(SessionError::ConnectionInProgress),
            SessionState::Discovering => return Err(SessionError::DiscoveryInProgress),
            _ => {}
        }

        let mut advertisements = shared.adapter.start_scan(&filter).await.map_err(|e| {
            warn!("Failed to start BLE scan: {}", e);
            SessionError::ScanFailed(e.to_string())
        })?;

        let events = shared.events.clone();
        let scan_filter = filter.clone();
        let task = tokio::spawn(async move {
            while let Some(advertisement) = advertisements.recv().await {
                if !scan_filter.matches(&advertisement.data) {
                    continue;
                }
                let record = DeviceRecord::from(advertisement);
                debug!("Scan matched device {}", record.id);
                let _ = events.send(SessionEvent::DeviceFound(record.clone()));
                on_match(record);
            }
            debug!("Advertisement stream ended");
        });

        let resume_state = inner.state;
        shared.transition(&mut inner, SessionState::Scanning);
        inner.scan = Some(ActiveScan { resume_state, task });
        info!(
            "Started BLE scan for {} service(s), legacy={}",
            filter.services.len(),
            filter.legacy
        );
        Ok(())
    }

    /// Stop the active scan and restore the state held before it started
    ///
    /// Stopping without an active scan is a no-op.
    pub async fn stop_scan(&self) -> SessionResult<()> {
        let mut inner = self.shared.inner.write().await;
        self.shared.stop_scan_locked(&mut inner).await
    }

    /// Connect to a device and make it the active one
    ///
    /// Connecting to the already active device is a no-op. A different
    /// device requires an explicit [`SessionManager::disconnect`] first.
    /// An active scan is stopped before connecting.
    pub async fn connect(&self, device: &DeviceId) -> SessionResult<()> {
        let shared = &self.shared;
        {
            let mut inner = shared.inner.write().await;
            if !inner.initialized {
                return Err(SessionError::NotInitialized);
            }
            if inner.state == SessionState::Connecting {
                return Err(SessionError::ConnectionInProgress);
            }
            if let Some(active) = &inner.active {
                if active == device {
                    debug!("Already connected to {}", device);
                    return Ok(());
                }
                return Err(SessionError::AlreadyConnected {
                    active: active.clone(),
                });
            }
            if let Err(e) = shared.stop_scan_locked(&mut inner).await {
                warn!("Connecting despite scan stop failure: {}", e);
            }
            inner.connecting = Some(device.clone());
            inner.connect_lost = false;
            shared.transition(&mut inner, SessionState::Connecting);
        }

        info!("Connecting to {}", device);
        let result = timeout(shared.config.connection_timeout, shared.adapter.connect(device)).await;

        let outcome = match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => {
                // The radio may still complete the attempt; make sure it does not linger
                if let Err(e) = shared.adapter.disconnect(device).await {
                    debug!("Cleanup after connect timeout failed: {}", e);
                }
                Err(format!(
                    "connection timed out after {:?}",
                    shared.config.connection_timeout
                ))
            }
        };

        let mut inner = shared.inner.write().await;
        inner.connecting = None;
        let lost = std::mem::take(&mut inner.connect_lost);
        let reason = match outcome {
            Ok(()) if !lost => {
                inner.active = Some(device.clone());
                inner.gatt = None;
                shared.transition(&mut inner, SessionState::Connected);
                info!("Connected to {}", device);
                return Ok(());
            }
            Ok(()) => "link lost during connect".to_string(),
            Err(reason) => reason,
        };

        error!("Failed to connect to {}: {}", device, reason);
        shared.transition(&mut inner, SessionState::Error);
        Err(SessionError::ConnectionFailed(reason))
    }

    /// Disconnect the active device
    ///
    /// Without an active device this is a no-op. The session is
    /// `Disconnected` as soon as this returns; the radio's own report of the
    /// disconnect still reaches the device's listener but does not change
    /// the state again.
    ///
    /// If the radio refuses the disconnect, the link is restored as it was
    /// (a discovery cut short by the attempt leaves it `Connected`) unless
    /// the link changed in the meantime.
    pub async fn disconnect(&self) -> SessionResult<()> {
        let shared = &self.shared;
        let (device, restore) = {
            let mut inner = shared.inner.write().await;
            let previous = match inner.settled_state() {
                SessionState::Discovering => SessionState::Connected,
                state => state,
            };
            let gatt = inner.gatt.clone();
            let Some(device) = shared.drop_link(&mut inner) else {
                return Ok(());
            };
            inner.solicited.insert(device.clone());
            (device, (previous, gatt, inner.link_epoch))
        };

        if let Err(e) = shared.adapter.disconnect(&device).await {
            warn!("Failed to disconnect from {}: {}", device, e);
            let (previous, gatt, epoch) = restore;
            let mut inner = shared.inner.write().await;
            inner.solicited.remove(&device);
            if inner.link_epoch == epoch && inner.active.is_none() && inner.connecting.is_none() {
                inner.active = Some(device.clone());
                inner.gatt = gatt;
                shared.settle(&mut inner, previous);
                debug!("Link to {} kept after failed disconnect", device);
            }
            return Err(SessionError::DisconnectFailed(e.to_string()));
        }
        info!("Disconnected from {}", device);
        Ok(())
    }

    /// Discover every service, characteristic and descriptor of the active device
    ///
    /// Discovery must settle before another one is issued; a concurrent call
    /// fails with [`SessionError::DiscoveryInProgress`].
    pub async fn discover_all(&self) -> SessionResult<()> {
        let shared = &self.shared;
        let (device, epoch) = {
            let mut inner = shared.inner.write().await;
            if inner.state == SessionState::Discovering {
                return Err(SessionError::DiscoveryInProgress);
            }
            let Some(device) = inner.active.clone() else {
                return Err(SessionError::DiscoveryFailed(
                    "no active connection".to_string(),
                ));
            };
            if !matches!(inner.state, SessionState::Connected | SessionState::Ready) {
                return Err(SessionError::DiscoveryFailed(format!(
                    "cannot discover while {}",
                    inner.state
                )));
            }
            inner.gatt = None;
            shared.transition(&mut inner, SessionState::Discovering);
            (device, inner.link_epoch)
        };

        debug!("Discovering services on {}", device);
        let result = shared.adapter.discover(&device).await;

        let mut inner = shared.inner.write().await;
        if inner.link_epoch != epoch {
            debug!("Discarding discovery result for {} after link loss", device);
            return Err(SessionError::DiscoveryFailed(
                "link lost during discovery".to_string(),
            ));
        }

        match result {
            Ok(table) => {
                info!(
                    "Discovered {} service(s), {} characteristic(s) on {}",
                    table.service_count(),
                    table.characteristic_count(),
                    device
                );
                inner.gatt = Some(table);
                shared.transition(&mut inner, SessionState::Ready);
                Ok(())
            }
            Err(e) => {
                error!("Failed to discover services on {}: {}", device, e);
                shared.transition(&mut inner, SessionState::Connected);
                Err(SessionError::DiscoveryFailed(e.to_string()))
            }
        }
    }

    /// Read a descriptor of the active device
    ///
    /// Requires `Ready`, or a scan started while `Ready`. The value is
    /// returned unmodified. Radio failures are reported as
    /// [`SessionError::ReadFailed`] and never retried.
    pub async fn read_descriptor(&self, address: &CharacteristicAddress) -> SessionResult<Vec<u8>> {
        let device = self.resolve(address).await?;
        let value = self
            .shared
            .adapter
            .read_descriptor(&device, address)
            .await
            .map_err(|e| {
                warn!("Failed to read {} on {}: {}", address, device, e);
                SessionError::ReadFailed(e.to_string())
            })?;
        debug!("Read {} byte(s) from {}", value.len(), address);
        Ok(value)
    }

    /// Write a descriptor of the active device and wait for the radio to confirm
    pub async fn write_descriptor(
        &self,
        address: &CharacteristicAddress,
        payload: &[u8],
    ) -> SessionResult<()> {
        let device = self.resolve(address).await?;
        self.shared
            .adapter
            .write_descriptor(&device, address, payload)
            .await
            .map_err(|e| {
                warn!("Failed to write {} on {}: {}", address, device, e);
                SessionError::WriteFailed(e.to_string())
            })?;
        debug!("Wrote {} byte(s) to {}", payload.len(), address);
        Ok(())
    }

    /// Register the listener invoked when `device` disconnects
    ///
    /// Replaces any earlier listener for the device. The device does not
    /// need to be connected.
    pub fn register_disconnect_listener<F>(&self, device: DeviceId, listener: F)
    where
        F: Fn(&DisconnectEvent) + Send + Sync + 'static,
    {
        info!("Registered disconnect listener for {}", device);
        self.shared.notifier.register(device, listener);
    }

    pub fn notifier(&self) -> &DisconnectNotifier {
        &self.shared.notifier
    }

    /// Descriptor I/O needs `Ready`; a scan started from `Ready` still counts
    async fn resolve(&self, address: &CharacteristicAddress) -> SessionResult<DeviceId> {
        let inner = self.shared.inner.read().await;
        if inner.settled_state() != SessionState::Ready {
            return Err(SessionError::AddressNotFound { address: *address });
        }
        match (&inner.active, &inner.gatt) {
            (Some(device), Some(table)) if table.contains(address) => Ok(device.clone()),
            _ => Err(SessionError::AddressNotFound { address: *address }),
        }
    }
}

impl<A: RadioAdapter> Drop for SessionManager<A> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.shared.inner.try_write() {
            if let Some(scan) = inner.scan.take() {
                scan.task.abort();
            }
            if let Some(dispatch) = inner.dispatch.take() {
                dispatch.abort();
            }
        }
    }
}
