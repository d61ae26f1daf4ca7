//! Per-device disconnect listener registry
//!
//! Listeners are keyed by [`DeviceId`] and live independently of any
//! connection: registering for a device that is not connected is valid and
//! simply stays dormant. Registration is last-writer-wins and entries are
//! never removed automatically, so a listener keeps observing the device
//! across reconnects.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::types::{DeviceId, DisconnectEvent};

/// Callback invoked when a device disconnects
pub type DisconnectListener = Arc<dyn Fn(&DisconnectEvent) + Send + Sync>;

/// Keyed registry of disconnect listeners
#[derive(Default)]
pub struct DisconnectNotifier {
    listeners: DashMap<DeviceId, DisconnectListener>,
}

impl DisconnectNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener, replacing any previous one for the device
    ///
    /// Returns true when a previous listener was replaced.
    pub fn register<F>(&self, device: DeviceId, listener: F) -> bool
    where
        F: Fn(&DisconnectEvent) + Send + Sync + 'static,
    {
        let replaced = self.listeners.insert(device, Arc::new(listener)).is_some();
        if replaced {
            debug!("Replaced disconnect listener");
        }
        replaced
    }

    /// Invoke the listener registered for the event's device
    ///
    /// Returns false when no listener is registered.
    pub fn notify(&self, event: &DisconnectEvent) -> bool {
        // Clone out so the shard lock is released before the callback runs;
        // a listener may re-register itself.
        let listener = self
            .listeners
            .get(&event.device)
            .map(|entry| Arc::clone(entry.value()));

        match listener {
            Some(listener) => {
                listener(event);
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, device: &DeviceId) -> bool {
        self.listeners.contains_key(device)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for DisconnectNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisconnectNotifier")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
