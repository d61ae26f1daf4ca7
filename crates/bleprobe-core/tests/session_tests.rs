//! Integration tests for the BLE session manager
//!
//! These drive a [`SessionManager`] against the scripted mock radio through
//! the scan, connect, discover, descriptor I/O and disconnect lifecycle,
//! including the rejection paths for overlapping operations.

use std::sync::Arc;
use std::time::Duration;

use bleprobe_core::gatt::{self, current_time_descriptor};
use bleprobe_core::mock::{advertisement_record, MockDevice, MockRadioAdapter, SAMPLE_DEVICE_ID};
use bleprobe_core::*;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

const WAIT: Duration = Duration::from_secs(2);

fn sample_id() -> DeviceId {
    DeviceId::new(SAMPLE_DEVICE_ID)
}

async fn initialized(radio: &MockRadioAdapter) -> SessionManager<MockRadioAdapter> {
    let manager = SessionManager::new(Arc::new(radio.clone()));
    manager.initialize().await.unwrap();
    manager
}

/// A session connected to the sample device with discovery completed
async fn ready(radio: &MockRadioAdapter) -> SessionManager<MockRadioAdapter> {
    let manager = initialized(radio).await;
    manager.connect(&sample_id()).await.unwrap();
    manager.discover_all().await.unwrap();
    assert_eq!(manager.state().await, SessionState::Ready);
    manager
}

async fn wait_for_state(manager: &SessionManager<MockRadioAdapter>, expected: SessionState) {
    let reached = timeout(WAIT, async {
        while manager.state().await != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "session never reached {}", expected);
}

// ----------------------------------------------------------------------------
// Initialization
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = SessionManager::new(Arc::new(radio));
    assert_eq!(manager.state().await, SessionState::Uninitialized);

    manager.initialize().await.unwrap();
    assert_eq!(manager.state().await, SessionState::Disconnected);

    manager.initialize().await.unwrap();
    assert_eq!(manager.state().await, SessionState::Disconnected);
}

#[tokio::test]
async fn test_initialize_without_radio() {
    let radio = MockRadioAdapter::builder().with_radio_absent().build();
    let manager = SessionManager::new(Arc::new(radio));

    let result = manager.initialize().await;
    assert!(matches!(result, Err(SessionError::AdapterUnavailable(_))));
    assert_eq!(manager.state().await, SessionState::Error);

    // Still unusable, but still answering
    let result = manager.initialize().await;
    assert!(matches!(result, Err(SessionError::AdapterUnavailable(_))));
}

#[tokio::test]
async fn test_operations_require_initialization() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = SessionManager::new(Arc::new(radio));

    assert_eq!(
        manager.scan(ScanFilter::new(), |_| {}).await,
        Err(SessionError::NotInitialized)
    );
    assert_eq!(
        manager.connect(&sample_id()).await,
        Err(SessionError::NotInitialized)
    );
    assert_eq!(manager.state().await, SessionState::Uninitialized);
}

// ----------------------------------------------------------------------------
// Scanning
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_scan_reports_matching_devices_only() {
    let radio = MockRadioAdapter::builder()
        .with_device(
            MockDevice::new(SAMPLE_DEVICE_ID)
                .with_rssi(-60)
                .with_advertisement(advertisement_record("nRF Time Probe", &[0x1847])),
        )
        .with_device(
            MockDevice::new("11:22:33:44:55:66")
                .with_advertisement(advertisement_record("Battery Tag", &[0x180F])),
        )
        .build();
    let manager = initialized(&radio).await;

    let (found_tx, mut found_rx) = mpsc::unbounded_channel();
    manager
        .scan(
            ScanFilter::new().with_service(gatt::DEVICE_TIME_SERVICE_UUID),
            move |device| {
                let _ = found_tx.send(device);
            },
        )
        .await
        .unwrap();
    assert_eq!(manager.state().await, SessionState::Scanning);

    let device = timeout(WAIT, found_rx.recv()).await.unwrap().unwrap();
    assert_eq!(device.id, sample_id());
    assert_eq!(device.advertised_name.as_deref(), Some("nRF Time Probe"));
    assert_eq!(device.rssi, Some(-60));
    assert!(device.name_matches("NRF TIME PROBE"));

    // Re-advertisements are reported again; the filtered-out device never is
    assert!(radio.advertise(&DeviceId::new("11:22:33:44:55:66")).await);
    assert!(radio.advertise(&sample_id()).await);
    let again = timeout(WAIT, found_rx.recv()).await.unwrap().unwrap();
    assert_eq!(again.id, sample_id());
    assert!(found_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_second_scan_is_rejected() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = initialized(&radio).await;

    manager.scan(ScanFilter::new(), |_| {}).await.unwrap();
    assert_eq!(
        manager.scan(ScanFilter::new(), |_| {}).await,
        Err(SessionError::ScanAlreadyActive)
    );
    assert_eq!(radio.scans_started().await, 1);
}

#[tokio::test]
async fn test_stop_scan_restores_state() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = initialized(&radio).await;

    // Stopping without a scan is a no-op
    manager.stop_scan().await.unwrap();

    manager.scan(ScanFilter::new(), |_| {}).await.unwrap();
    assert!(radio.is_scanning().await);

    manager.stop_scan().await.unwrap();
    assert_eq!(manager.state().await, SessionState::Disconnected);
    assert!(!radio.is_scanning().await);

    // A fresh scan may start after the previous one stopped
    manager.scan(ScanFilter::new(), |_| {}).await.unwrap();
    assert_eq!(radio.scans_started().await, 2);
}

#[tokio::test]
async fn test_extended_scan_sees_extended_only_devices() {
    let radio = MockRadioAdapter::builder()
        .with_device(
            MockDevice::new("AA:AA:AA:AA:AA:AA")
                .with_extended_only(true)
                .with_advertisement(advertisement_record("Coded PHY Probe", &[0x1847])),
        )
        .build();
    let manager = initialized(&radio).await;

    let (found_tx, mut found_rx) = mpsc::unbounded_channel();
    manager
        .scan(ScanFilter::new().with_legacy(false), move |device| {
            let _ = found_tx.send(device.id);
        })
        .await
        .unwrap();

    let id = timeout(WAIT, found_rx.recv()).await.unwrap().unwrap();
    assert_eq!(id, DeviceId::new("AA:AA:AA:AA:AA:AA"));
}

// ----------------------------------------------------------------------------
// Connection
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_connect_is_idempotent_for_same_device() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = initialized(&radio).await;

    manager.connect(&sample_id()).await.unwrap();
    manager.connect(&sample_id()).await.unwrap();

    assert_eq!(manager.state().await, SessionState::Connected);
    assert_eq!(manager.active_device().await, Some(sample_id()));
    assert!(radio.is_connected(&sample_id()).await);
}

#[tokio::test]
async fn test_connect_to_second_device_requires_disconnect() {
    let radio = MockRadioAdapter::builder()
        .with_device(MockDevice::new(SAMPLE_DEVICE_ID))
        .with_device(MockDevice::new("BB:BB:BB:BB:BB:BB"))
        .build();
    let manager = initialized(&radio).await;
    let other = DeviceId::new("BB:BB:BB:BB:BB:BB");

    manager.connect(&sample_id()).await.unwrap();
    assert_eq!(
        manager.connect(&other).await,
        Err(SessionError::AlreadyConnected { active: sample_id() })
    );
    assert_eq!(manager.state().await, SessionState::Connected);

    manager.disconnect().await.unwrap();
    manager.connect(&other).await.unwrap();
    assert_eq!(manager.active_device().await, Some(other));
}

#[tokio::test]
async fn test_connect_stops_active_scan() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = initialized(&radio).await;

    manager.scan(ScanFilter::new(), |_| {}).await.unwrap();
    manager.connect(&sample_id()).await.unwrap();

    assert!(!radio.is_scanning().await);
    assert_eq!(manager.state().await, SessionState::Connected);
}

#[tokio::test]
async fn test_failed_connect_can_be_retried() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = initialized(&radio).await;

    radio
        .fail_next_connect(AdapterError::Operation("GATT error 133".to_string()))
        .await;
    let result = manager.connect(&sample_id()).await;
    assert!(matches!(result, Err(SessionError::ConnectionFailed(reason)) if reason.contains("133")));
    assert_eq!(manager.state().await, SessionState::Error);
    assert_eq!(manager.active_device().await, None);

    manager.connect(&sample_id()).await.unwrap();
    assert_eq!(manager.state().await, SessionState::Connected);
}

#[tokio::test]
async fn test_link_lost_while_connecting() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = initialized(&radio).await;

    let (reason_tx, mut reason_rx) = mpsc::unbounded_channel();
    manager.register_disconnect_listener(sample_id(), move |event| {
        let _ = reason_tx.send(event.reason.clone());
    });

    radio
        .drop_link_during_next_connect("connection failed to be established")
        .await;
    let err = assert_err!(manager.connect(&sample_id()).await);
    assert_eq!(
        err,
        SessionError::ConnectionFailed("link lost during connect".to_string())
    );
    assert!(!radio.is_connected(&sample_id()).await);
    assert_eq!(manager.state().await, SessionState::Error);
    assert_eq!(manager.active_device().await, None);

    let reason = timeout(WAIT, reason_rx.recv()).await.unwrap().unwrap();
    assert_eq!(reason.as_deref(), Some("connection failed to be established"));

    // The next attempt gets a live link
    assert_ok!(manager.connect(&sample_id()).await);
    assert!(radio.is_connected(&sample_id()).await);
    assert_eq!(manager.state().await, SessionState::Connected);
    assert_ok!(manager.discover_all().await);
}

#[tokio::test]
async fn test_connect_to_unknown_device_fails() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = initialized(&radio).await;

    let result = manager.connect(&DeviceId::new("00:00:00:00:00:00")).await;
    assert!(matches!(result, Err(SessionError::ConnectionFailed(_))));
    assert_eq!(manager.state().await, SessionState::Error);
}

#[tokio::test]
async fn test_connect_timeout() {
    let radio = MockRadioAdapter::builder()
        .with_device(MockDevice::new(SAMPLE_DEVICE_ID))
        .with_connect_delay(Duration::from_millis(500))
        .build();
    let config = SessionConfig::new().with_connection_timeout(Duration::from_millis(20));
    let manager = SessionManager::with_config(Arc::new(radio.clone()), config);
    manager.initialize().await.unwrap();

    let result = manager.connect(&sample_id()).await;
    assert!(matches!(result, Err(SessionError::ConnectionFailed(reason)) if reason.contains("timed out")));
    assert_eq!(manager.state().await, SessionState::Error);
    assert!(!radio.is_connected(&sample_id()).await);
}

#[tokio::test]
async fn test_concurrent_connect_is_rejected() {
    let radio = MockRadioAdapter::builder()
        .with_device(MockDevice::new(SAMPLE_DEVICE_ID))
        .with_connect_delay(Duration::from_millis(100))
        .build();
    let manager = initialized(&radio).await;

    let first_id = sample_id();
    let (first, second) = tokio::join!(manager.connect(&first_id), async {
        wait_for_state(&manager, SessionState::Connecting).await;
        manager.connect(&sample_id()).await
    });

    assert_eq!(first, Ok(()));
    assert_eq!(second, Err(SessionError::ConnectionInProgress));
}

// ----------------------------------------------------------------------------
// Discovery and Descriptor I/O
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_descriptor_io_requires_discovery() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = initialized(&radio).await;
    manager.connect(&sample_id()).await.unwrap();

    let address = current_time_descriptor();
    assert_eq!(
        manager.read_descriptor(&address).await,
        Err(SessionError::AddressNotFound { address })
    );
    assert_eq!(
        manager.write_descriptor(&address, &[1, 2, 3]).await,
        Err(SessionError::AddressNotFound { address })
    );
    assert!(radio.writes().await.is_empty());
}

#[tokio::test]
async fn test_discover_without_connection() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = initialized(&radio).await;

    let result = manager.discover_all().await;
    assert!(matches!(result, Err(SessionError::DiscoveryFailed(_))));
    assert_eq!(manager.state().await, SessionState::Disconnected);
}

#[tokio::test]
async fn test_read_and_write_after_discovery() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = ready(&radio).await;
    let address = current_time_descriptor();

    let table = manager.gatt_table().await.unwrap();
    assert!(table.contains(&address));

    let value = manager.read_descriptor(&address).await.unwrap();
    assert_eq!(
        codec::decode_time_payload(&codec::to_transport(&value)).as_deref(),
        Some("2024-05-10T14:30:05.000Z")
    );

    let payload = [0x07, 0xE9, 1, 2, 3, 4, 5];
    manager.write_descriptor(&address, &payload).await.unwrap();
    assert_eq!(manager.read_descriptor(&address).await.unwrap(), payload.to_vec());
    assert_eq!(radio.writes().await, vec![(sample_id(), address, payload.to_vec())]);
}

#[tokio::test]
async fn test_unknown_address_is_rejected() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = ready(&radio).await;

    let address = CharacteristicAddress::new(
        gatt::DEVICE_TIME_SERVICE_UUID,
        gatt::CURRENT_TIME_CHARACTERISTIC_UUID,
        gatt::uuid_from_u16(0x2902),
    );
    assert_eq!(
        manager.read_descriptor(&address).await,
        Err(SessionError::AddressNotFound { address })
    );
}

#[tokio::test]
async fn test_read_failure_is_not_retried() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = ready(&radio).await;
    let address = current_time_descriptor();

    radio
        .fail_next_read(AdapterError::LinkLost("insufficient authentication".to_string()))
        .await;
    let result = manager.read_descriptor(&address).await;
    assert!(matches!(result, Err(SessionError::ReadFailed(_))));

    // The failure was consumed by the first read, so a caller retry succeeds
    assert_ok!(manager.read_descriptor(&address).await);
    assert_eq!(manager.state().await, SessionState::Ready);
}

#[tokio::test]
async fn test_write_failure_leaves_value_untouched() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = ready(&radio).await;
    let address = current_time_descriptor();
    let before = manager.read_descriptor(&address).await.unwrap();

    radio.fail_next_write(AdapterError::PermissionDenied).await;
    let result = manager.write_descriptor(&address, &[9; 7]).await;
    assert!(matches!(result, Err(SessionError::WriteFailed(_))));
    assert_eq!(manager.read_descriptor(&address).await.unwrap(), before);
}

#[tokio::test]
async fn test_descriptor_io_during_scan_from_ready() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = ready(&radio).await;
    let address = current_time_descriptor();

    manager.scan(ScanFilter::new(), |_| {}).await.unwrap();
    assert_eq!(manager.state().await, SessionState::Scanning);
    assert_ok!(manager.read_descriptor(&address).await);

    // Once the link is gone the scan settles to Disconnected and I/O stops
    radio.trigger_disconnect(&sample_id(), None).await;
    timeout(WAIT, async {
        while manager.active_device().await.is_some() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(
        assert_err!(manager.write_descriptor(&address, &[1; 7]).await),
        SessionError::AddressNotFound { address }
    );

    manager.stop_scan().await.unwrap();
    assert_eq!(manager.state().await, SessionState::Disconnected);
}

#[tokio::test]
async fn test_concurrent_discovery_is_rejected() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = initialized(&radio).await;
    manager.connect(&sample_id()).await.unwrap();

    let gate = radio.gate_discovery().await;
    let (first, second) = tokio::join!(manager.discover_all(), async {
        wait_for_state(&manager, SessionState::Discovering).await;
        let second = manager.discover_all().await;
        gate.notify_one();
        second
    });

    assert_eq!(first, Ok(()));
    assert_eq!(second, Err(SessionError::DiscoveryInProgress));
    assert_eq!(manager.state().await, SessionState::Ready);
}

#[tokio::test]
async fn test_failed_discovery_returns_to_connected() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = initialized(&radio).await;
    manager.connect(&sample_id()).await.unwrap();

    radio
        .fail_next_discover(AdapterError::Operation("ATT timeout".to_string()))
        .await;
    let result = manager.discover_all().await;
    assert!(matches!(result, Err(SessionError::DiscoveryFailed(_))));
    assert_eq!(manager.state().await, SessionState::Connected);
    assert!(manager.gatt_table().await.is_none());

    manager.discover_all().await.unwrap();
    assert_eq!(manager.state().await, SessionState::Ready);
}

#[tokio::test]
async fn test_scan_rejected_during_discovery() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = initialized(&radio).await;
    manager.connect(&sample_id()).await.unwrap();

    let gate = radio.gate_discovery().await;
    let (discovered, scan) = tokio::join!(manager.discover_all(), async {
        wait_for_state(&manager, SessionState::Discovering).await;
        let scan = manager.scan(ScanFilter::new(), |_| {}).await;
        gate.notify_one();
        scan
    });

    assert_eq!(discovered, Ok(()));
    assert_eq!(scan, Err(SessionError::DiscoveryInProgress));
}

// ----------------------------------------------------------------------------
// Disconnect Handling
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_unsolicited_disconnect_without_listener() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = ready(&radio).await;

    assert!(radio.trigger_disconnect(&sample_id(), Some("remote user terminated")).await);
    wait_for_state(&manager, SessionState::Disconnected).await;
    assert_eq!(manager.active_device().await, None);
}

#[tokio::test]
async fn test_listener_receives_reason() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = initialized(&radio).await;

    // Registered before any connection exists
    let (reason_tx, mut reason_rx) = mpsc::unbounded_channel();
    manager.register_disconnect_listener(sample_id(), move |event| {
        let _ = reason_tx.send(event.reason.clone());
    });

    manager.connect(&sample_id()).await.unwrap();
    radio
        .trigger_disconnect(&sample_id(), Some("connection supervision timeout"))
        .await;

    let reason = timeout(WAIT, reason_rx.recv()).await.unwrap().unwrap();
    assert_eq!(reason.as_deref(), Some("connection supervision timeout"));
    wait_for_state(&manager, SessionState::Disconnected).await;
}

#[tokio::test]
async fn test_listener_survives_reconnect() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = initialized(&radio).await;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    manager.register_disconnect_listener(sample_id(), move |event| {
        let _ = event_tx.send(event.device.clone());
    });

    for _ in 0..2 {
        manager.connect(&sample_id()).await.unwrap();
        radio.trigger_disconnect(&sample_id(), None).await;
        let device = timeout(WAIT, event_rx.recv()).await.unwrap().unwrap();
        assert_eq!(device, sample_id());
        wait_for_state(&manager, SessionState::Disconnected).await;
    }
    assert!(manager.notifier().is_registered(&sample_id()));
}

#[tokio::test]
async fn test_disconnect_clears_gatt_table() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = ready(&radio).await;
    let address = current_time_descriptor();

    radio.trigger_disconnect(&sample_id(), None).await;
    wait_for_state(&manager, SessionState::Disconnected).await;

    assert!(manager.gatt_table().await.is_none());
    assert_eq!(
        manager.read_descriptor(&address).await,
        Err(SessionError::AddressNotFound { address })
    );

    // A fresh connect alone does not restore the table
    manager.connect(&sample_id()).await.unwrap();
    assert_eq!(
        manager.read_descriptor(&address).await,
        Err(SessionError::AddressNotFound { address })
    );
    manager.discover_all().await.unwrap();
    assert_ok!(manager.read_descriptor(&address).await);
}

#[tokio::test]
async fn test_disconnect_during_discovery() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = initialized(&radio).await;
    manager.connect(&sample_id()).await.unwrap();

    let gate = radio.gate_discovery().await;
    let (result, _) = tokio::join!(manager.discover_all(), async {
        wait_for_state(&manager, SessionState::Discovering).await;
        radio.trigger_disconnect(&sample_id(), Some("link loss")).await;
        wait_for_state(&manager, SessionState::Disconnected).await;
        gate.notify_one();
    });

    assert!(matches!(result, Err(SessionError::DiscoveryFailed(_))));
    assert_eq!(manager.state().await, SessionState::Disconnected);
    assert!(manager.gatt_table().await.is_none());
}

#[tokio::test]
async fn test_solicited_disconnect_then_reconnect() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = ready(&radio).await;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    manager.register_disconnect_listener(sample_id(), move |event| {
        let _ = event_tx.send(event.reason.clone());
    });

    manager.disconnect().await.unwrap();
    assert_eq!(manager.state().await, SessionState::Disconnected);
    manager.connect(&sample_id()).await.unwrap();

    // The radio's report of the earlier disconnect must not tear down the new link
    let reason = timeout(WAIT, event_rx.recv()).await.unwrap().unwrap();
    assert_eq!(reason, None);
    assert_eq!(manager.state().await, SessionState::Connected);
    assert_eq!(manager.active_device().await, Some(sample_id()));
}

#[tokio::test]
async fn test_refused_disconnect_keeps_link() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = ready(&radio).await;
    let address = current_time_descriptor();

    radio
        .fail_next_disconnect(AdapterError::Operation("busy".to_string()))
        .await;
    let err = assert_err!(manager.disconnect().await);
    assert!(matches!(err, SessionError::DisconnectFailed(reason) if reason.contains("busy")));

    assert!(radio.is_connected(&sample_id()).await);
    assert_eq!(manager.state().await, SessionState::Ready);
    assert_eq!(manager.active_device().await, Some(sample_id()));
    assert_ok!(manager.read_descriptor(&address).await);

    assert_ok!(manager.disconnect().await);
    assert_eq!(manager.state().await, SessionState::Disconnected);
    assert!(!radio.is_connected(&sample_id()).await);
}

#[tokio::test]
async fn test_disconnect_without_connection_is_noop() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = initialized(&radio).await;

    manager.disconnect().await.unwrap();
    assert_eq!(manager.state().await, SessionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_during_scan_keeps_scanning() {
    let radio = MockRadioAdapter::builder()
        .with_device(MockDevice::new(SAMPLE_DEVICE_ID))
        .with_device(MockDevice::new("BB:BB:BB:BB:BB:BB"))
        .build();
    let manager = initialized(&radio).await;
    manager.connect(&sample_id()).await.unwrap();
    manager.scan(ScanFilter::new(), |_| {}).await.unwrap();

    radio.trigger_disconnect(&sample_id(), None).await;
    timeout(WAIT, async {
        while manager.active_device().await.is_some() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(manager.state().await, SessionState::Scanning);

    manager.stop_scan().await.unwrap();
    assert_eq!(manager.state().await, SessionState::Disconnected);
}

// ----------------------------------------------------------------------------
// Session Events
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_events_follow_lifecycle() {
    let radio = MockRadioAdapter::with_sample_device();
    let manager = SessionManager::new(Arc::new(radio.clone()));
    let mut events = manager.subscribe();

    manager.initialize().await.unwrap();
    manager.connect(&sample_id()).await.unwrap();
    radio.trigger_disconnect(&sample_id(), Some("link loss")).await;

    let mut transitions = Vec::new();
    let disconnected = timeout(WAIT, async {
        loop {
            match events.recv().await.unwrap() {
                SessionEvent::StateChanged { to, .. } => transitions.push(to),
                SessionEvent::Disconnected(event) => return event,
                SessionEvent::DeviceFound(_) => {}
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(disconnected.reason.as_deref(), Some("link loss"));
    assert_eq!(
        transitions,
        vec![
            SessionState::Initializing,
            SessionState::Disconnected,
            SessionState::Connecting,
            SessionState::Connected,
            SessionState::Disconnected,
        ]
    );
}

#[tokio::test]
async fn test_auto_disconnect_reaches_listener() {
    let radio = MockRadioAdapter::builder()
        .with_device(MockDevice::new(SAMPLE_DEVICE_ID))
        .with_auto_disconnect_after(Duration::from_millis(20))
        .build();
    let manager = initialized(&radio).await;

    let (reason_tx, mut reason_rx) = mpsc::unbounded_channel();
    manager.register_disconnect_listener(sample_id(), move |event| {
        let _ = reason_tx.send(event.reason.clone());
    });
    manager.connect(&sample_id()).await.unwrap();

    let reason = timeout(WAIT, reason_rx.recv()).await.unwrap().unwrap();
    assert!(reason.is_some());
    wait_for_state(&manager, SessionState::Disconnected).await;
}
