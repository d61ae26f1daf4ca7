//! Error handling for the bleprobe CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("BLE session error: {0}")]
    Session(#[from] bleprobe_core::SessionError),

    #[error("Payload encoding error: {0}")]
    Codec(#[from] bleprobe_core::CodecError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No device named '{name}' found within {waited_secs}s")]
    DeviceNotFound { name: String, waited_secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
