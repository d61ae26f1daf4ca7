//! bleprobe CLI library
//!
//! This library provides the pieces of the `bleprobe` binary: argument
//! parsing, TOML configuration, the timestamped readout and the diagnostic
//! flows that drive a [`bleprobe_core::SessionManager`].

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod readout;

pub use cli::{Cli, Commands};
pub use commands::{autodisconnect, AutodisconnectOptions, AutodisconnectReport, CommandDispatcher};
pub use config::AppConfig;
pub use error::{CliError, Result};
pub use readout::Readout;
