//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Drive the built-in simulated radio instead of the host adapter
    #[arg(long)]
    pub simulate: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for advertising devices and print every new one
    Scan {
        /// Service UUID to filter on (16-bit hex such as 1847, or a full UUID)
        #[arg(short, long = "service")]
        services: Vec<String>,
        /// Include extended advertisements
        #[arg(long)]
        extended: bool,
        /// Seconds to scan before stopping
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Find a device by name, exercise the time descriptor and wait for it to disconnect
    Autodisconnect {
        /// Advertised name of the device (case-insensitive)
        #[arg(short, long)]
        name: Option<String>,
        /// Include extended advertisements while looking for the device
        #[arg(long)]
        extended: bool,
        /// Write the current local time before reading it back
        #[arg(long)]
        write_time: bool,
        /// Seconds to wait for the device to disconnect
        #[arg(short, long)]
        wait: Option<u64>,
    },
    /// Decode a base64 current time payload
    Decode {
        /// Base64 encoded descriptor value
        payload: String,
    },
}
