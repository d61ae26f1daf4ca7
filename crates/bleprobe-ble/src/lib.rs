//! btleplug radio adapter for bleprobe
//!
//! This crate provides [`BtleplugAdapter`], a [`RadioAdapter`] backed by the
//! host's Bluetooth stack through btleplug's central role, so a
//! [`bleprobe_core::SessionManager`] can drive real hardware.
//!
//! ## Architecture
//!
//! - [`config`] - adapter selection and channel sizing
//! - [`error`] - btleplug failures and their mapping onto [`AdapterError`](bleprobe_core::AdapterError)
//! - [`properties`] - conversion of btleplug peripheral data into bleprobe types
//! - [`adapter`] - the [`RadioAdapter`] implementation and its event pump
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bleprobe_ble::BtleplugAdapter;
//! use bleprobe_core::SessionManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = SessionManager::new(Arc::new(BtleplugAdapter::new()));
//! manager.initialize().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Support
//!
//! Whatever btleplug supports in the central role: BlueZ on Linux, Core
//! Bluetooth on macOS and WinRT on Windows. Descriptor writes go through the
//! platform's write-with-response path.

pub mod adapter;
pub mod config;
pub mod error;
pub mod properties;

// Public API exports
pub use adapter::BtleplugAdapter;
pub use config::BtleplugConfig;
pub use error::{BleError, BleResult};

// Re-export the adapter trait for convenience
pub use bleprobe_core::RadioAdapter;
