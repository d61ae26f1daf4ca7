//! Command handlers for the bleprobe CLI

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bleprobe_ble::BtleplugAdapter;
use bleprobe_core::codec::{self, TimePayload};
use bleprobe_core::gatt::{self, current_time_descriptor};
use bleprobe_core::mock::{sample_device, MockRadioAdapter};
use bleprobe_core::{
    decode_time_payload, DeviceId, DeviceRecord, RadioAdapter, ScanFilter, SessionManager,
};
use chrono::Local;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::readout::Readout;

/// How long the simulated device stays connected in `--simulate` mode
const SIMULATED_LINK_LIFETIME: Duration = Duration::from_secs(3);

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command against the host radio or the simulator
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        if let Commands::Decode { payload } = &cli.command {
            return Self::handle_decode_command(payload);
        }

        if cli.simulate {
            info!("Using simulated radio");
            let radio = MockRadioAdapter::builder()
                .with_device(sample_device())
                .with_auto_disconnect_after(SIMULATED_LINK_LIFETIME)
                .build();
            Self::run(cli.command, &config, Arc::new(radio)).await
        } else {
            let radio = BtleplugAdapter::with_config(config.radio_config());
            Self::run(cli.command, &config, Arc::new(radio)).await
        }
    }

    async fn run<A: RadioAdapter>(
        command: Commands,
        config: &AppConfig,
        radio: Arc<A>,
    ) -> Result<()> {
        let manager = SessionManager::with_config(radio, config.session_config());

        match command {
            Commands::Scan {
                services,
                extended,
                duration,
            } => {
                let mut filter = ScanFilter::new().with_legacy(!extended);
                for service in &services {
                    filter = filter.with_service(parse_service(service)?);
                }
                let duration =
                    Duration::from_secs(duration.unwrap_or(config.flow.scan_duration_secs));
                Self::handle_scan_command(&manager, filter, duration).await
            }
            Commands::Autodisconnect {
                name,
                extended,
                write_time,
                wait,
            } => {
                let name = name.or_else(|| config.flow.device_name.clone()).ok_or_else(|| {
                    CliError::InvalidArgument(
                        "a device name is required (--name or flow.device_name)".to_string(),
                    )
                })?;
                let options = AutodisconnectOptions {
                    name,
                    extended,
                    write_time,
                    scan_timeout: Duration::from_secs(config.flow.scan_timeout_secs),
                    disconnect_wait: Duration::from_secs(
                        wait.unwrap_or(config.flow.disconnect_wait_secs),
                    ),
                };
                autodisconnect(&manager, &options, &Readout::stdout())
                    .await
                    .map(|_| ())
            }
            Commands::Decode { payload } => Self::handle_decode_command(&payload),
        }
    }

    /// Handle the scan command
    async fn handle_scan_command<A: RadioAdapter>(
        manager: &SessionManager<A>,
        filter: ScanFilter,
        duration: Duration,
    ) -> Result<()> {
        manager.initialize().await?;

        let seen = Mutex::new(HashSet::new());
        manager
            .scan(filter, move |device| {
                let first_sighting = seen
                    .lock()
                    .map(|mut seen| seen.insert(device.id.clone()))
                    .unwrap_or(true);
                if first_sighting {
                    println!("{}", format_device(&device));
                }
            })
            .await?;

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = tokio::signal::ctrl_c() => info!("Scan interrupted"),
        }

        manager.stop_scan().await?;
        Ok(())
    }

    /// Handle the decode command
    fn handle_decode_command(payload: &str) -> Result<()> {
        match decode_time_payload(payload) {
            Some(time) => println!("{}", time),
            None => println!("no value"),
        }
        Ok(())
    }
}

/// Parse a service argument as a 16-bit short form or a full UUID
pub fn parse_service(value: &str) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(value) {
        return Ok(uuid);
    }

    let short = value.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(short, 16)
        .map(gatt::uuid_from_u16)
        .map_err(|_| CliError::InvalidArgument(format!("not a service UUID: {}", value)))
}

/// One-line summary of a scan match
pub fn format_device(device: &DeviceRecord) -> String {
    let mut line = format!(
        "{}  {}",
        device.id,
        device.advertised_name.as_deref().unwrap_or("<unnamed>")
    );
    if let Some(rssi) = device.rssi {
        line.push_str(&format!("  rssi={}", rssi));
    }
    if let Some(data) = &device.advertisement.manufacturer_data {
        line.push_str(&format!("  mfr={}", hex::encode(data)));
    }
    line
}

// ----------------------------------------------------------------------------
// Autodisconnect Flow
// ----------------------------------------------------------------------------

/// Parameters of the autodisconnect diagnostic
#[derive(Debug, Clone)]
pub struct AutodisconnectOptions {
    /// Advertised name to look for, compared case-insensitively
    pub name: String,
    pub extended: bool,
    pub write_time: bool,
    pub scan_timeout: Duration,
    pub disconnect_wait: Duration,
}

/// What the autodisconnect diagnostic observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutodisconnectReport {
    pub device: DeviceId,
    /// Decoded time read back from the device
    pub time: Option<String>,
    /// Whether the device disconnected on its own within the wait
    pub disconnected: bool,
}

/// Find a device, exercise its time descriptor and wait for it to drop the link
///
/// Read and write failures are reported on the readout and do not end the
/// flow; failing to find, connect to or discover the device does.
pub async fn autodisconnect<A: RadioAdapter>(
    manager: &SessionManager<A>,
    options: &AutodisconnectOptions,
    readout: &Readout,
) -> Result<AutodisconnectReport> {
    manager.initialize().await?;

    readout.push("Looking for device");
    let (found_tx, mut found_rx) = mpsc::unbounded_channel();
    let expected = options.name.clone();
    let filter = ScanFilter::new()
        .with_service(gatt::DEVICE_TIME_SERVICE_UUID)
        .with_legacy(!options.extended);
    manager
        .scan(filter, move |device| {
            if device.name_matches(&expected) {
                let _ = found_tx.send(device.id);
            }
        })
        .await?;

    let device = match timeout(options.scan_timeout, found_rx.recv()).await {
        Ok(Some(device)) => device,
        _ => {
            manager.stop_scan().await?;
            return Err(CliError::DeviceNotFound {
                name: options.name.clone(),
                waited_secs: options.scan_timeout.as_secs(),
            });
        }
    };

    readout.push("Device found");
    manager.connect(&device).await?;
    readout.push(format!("Connected to {}", device));

    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel();
    let listener_readout = readout.clone();
    manager.register_disconnect_listener(device.clone(), move |event| {
        listener_readout.push("Disconnect listener received message");
        if let Some(reason) = &event.reason {
            warn!("Device {} disconnected with error: {}", event.device, reason);
        }
        let _ = disconnect_tx.send(event.clone());
    });
    readout.push(format!("Disconnect listener set up for {}", device));

    manager.discover_all().await?;

    let address = current_time_descriptor();
    if options.write_time {
        readout.push("new date written");
        let payload = TimePayload::from_datetime(&Local::now().naive_local())?;
        if let Err(e) = manager.write_descriptor(&address, &payload.to_bytes()).await {
            readout.push(format!("ERROR {}", e));
        }
    }

    let time = match manager.read_descriptor(&address).await {
        Ok(value) => {
            let time = decode_time_payload(&codec::to_transport(&value));
            readout.push(time.as_deref().unwrap_or("no value"));
            time
        }
        Err(e) => {
            readout.push(format!("ERROR {}", e));
            None
        }
    };

    let disconnected = match timeout(options.disconnect_wait, disconnect_rx.recv()).await {
        Ok(Some(_)) => true,
        _ => {
            readout.push(format!(
                "No disconnect within {}s",
                options.disconnect_wait.as_secs()
            ));
            manager.disconnect().await?;
            false
        }
    };

    Ok(AutodisconnectReport {
        device,
        time,
        disconnected,
    })
}
