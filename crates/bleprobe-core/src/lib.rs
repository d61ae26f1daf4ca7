//! bleprobe core: BLE session orchestration for peripheral diagnostics
//!
//! This crate owns everything between a presentation layer (the `bleprobe`
//! CLI) and a platform radio:
//!
//! - [`session`] - the [`SessionManager`] state machine wrapping a [`RadioAdapter`]
//! - [`notifier`] - per-device disconnect listener registry
//! - [`codec`] - the 7-byte "current time" descriptor layout
//! - [`advertisement`] - advertisement record (AD structure) parsing
//! - [`gatt`] - discovered GATT tables and well-known identifiers
//! - [`adapter`] - the radio primitive seam
//! - [`mock`] - a scripted in-memory radio for tests and simulation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bleprobe_core::{gatt, mock::MockRadioAdapter, ScanFilter, SessionManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let radio = Arc::new(MockRadioAdapter::with_sample_device());
//! let manager = SessionManager::new(radio);
//!
//! manager.initialize().await?;
//! manager
//!     .scan(ScanFilter::new().with_service(gatt::DEVICE_TIME_SERVICE_UUID), |device| {
//!         println!("found {}", device.id);
//!     })
//!     .await?;
//! manager.stop_scan().await?;
//! # Ok(())
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod adapter;
pub mod advertisement;
pub mod codec;
pub mod config;
pub mod errors;
pub mod gatt;
pub mod mock;
pub mod notifier;
pub mod session;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use adapter::{Advertisement, RadioAdapter};
pub use advertisement::AdvertisementData;
pub use codec::{decode_time_payload, encode_time_payload, TimePayload};
pub use config::SessionConfig;
pub use errors::{AdapterError, CodecError, SessionError, SessionResult};
pub use gatt::GattTable;
pub use notifier::DisconnectNotifier;
pub use session::{SessionEvent, SessionManager};
pub use types::{
    CharacteristicAddress, DeviceId, DeviceRecord, DisconnectEvent, ScanFilter, SessionState,
};
