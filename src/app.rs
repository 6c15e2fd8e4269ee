use std::sync::Arc;
use std::time::Duration;
use clap::Subcommand;
use log::{info, warn};
use tokio::runtime::Handle;
use tokio::time::{interval, sleep, MissedTickBehavior};

use crate::blocks::registry::ExtensionRegistry;
use crate::blocks::Extension;
use crate::config::types::BridgeConfig;
use crate::device::btle::BtleTransport;
use crate::device::driver::DriverContext;
use crate::device::profiles::find_profile;
use crate::device::transport::{ScanRequest, Transport};
use crate::error::AppRunError;
use crate::sim::device::SimProtocol;
use crate::sim::transport::SimTransport;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the block metadata of one extension, or of all of them, as JSON
    Info {
        extension: Option<String>,
    },
    /// List the Bluetooth LE peripherals an extension would offer to connect to
    Scan {
        extension: String,
        /// Overrides scanSeconds of the config file
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Run an extension against a simulated peripheral and print every reporter each frame
    Simulate {
        extension: String,
        #[arg(long, default_value_t = 100)]
        frames: u64,
    },
}

impl Command {
    /// Commands that use a peripheral need the config file lock.
    pub fn needs_radio(&self) -> bool {
        !matches!(self, Command::Info { .. })
    }
}

/// Drivers backed by the simulated transport and protocol, generating waveforms on `runtime`.
pub fn simulated_context(connect_delay: Duration, runtime: Handle) -> DriverContext {
    DriverContext::new(
        Arc::new(SimTransport::with_connect_delay(connect_delay, runtime.clone())),
        Arc::new(SimProtocol::waveform(runtime.clone())),
        runtime,
    )
}

fn find_extension<'a>(registry: &'a ExtensionRegistry, extension_id: &str) -> Result<&'a dyn Extension, AppRunError> {
    registry.get(extension_id).ok_or_else(|| AppRunError::UnknownExtension(extension_id.to_string()))
}

pub fn info(extension_id: Option<&str>) -> Result<String, AppRunError> {
    let registry = ExtensionRegistry::new(simulated_context(Duration::ZERO, Handle::current()));

    let json = match extension_id {
        Some(extension_id) => serde_json::to_string_pretty(&find_extension(&registry, extension_id)?.info())?,
        None => serde_json::to_string_pretty(&registry.info())?,
    };
    Ok(json)
}

pub async fn scan(extension_id: &str, duration: Duration) -> Result<String, AppRunError> {
    let profile = find_profile(extension_id)
        .ok_or_else(|| AppRunError::UnknownExtension(extension_id.to_string()))?;

    let transport = BtleTransport::new(Handle::current());
    let socket = transport.scan(ScanRequest::for_identity(&profile.identity), Box::new(|| {}));

    info!("Scanning {} for {} peripherals", humantime::format_duration(duration), profile.identity.name_prefix);
    sleep(duration).await;

    let candidates = socket.candidates();
    socket.disconnect();
    Ok(serde_json::to_string_pretty(&candidates)?)
}

/// One line of `simulate` output: the frame number, the connection state and every reporter value.
fn frame_line(registry: &ExtensionRegistry, extension: &dyn Extension, frame: u64) -> String {
    let info = extension.info();
    let values: Vec<String> = info.blocks.iter()
        .map(|block| {
            let args = info.default_args(block.opcode);
            match registry.call(info.id, block.opcode, &args) {
                Some(value) => format!("{}={}", block.opcode, value),
                None => format!("{}=-", block.opcode),
            }
        })
        .collect();

    format!("{:>5} {:<12} {}", frame, extension.driver().state().to_string(), values.join(" "))
}

pub async fn simulate(extension_id: &str, frames: u64, config: &BridgeConfig) -> Result<(), AppRunError> {
    let registry = ExtensionRegistry::new(simulated_context(config.simulated_connect_delay(), Handle::current()));
    let extension = find_extension(&registry, extension_id)?;

    extension.scan();
    match extension.driver().candidates().into_iter().next() {
        Some(candidate) => extension.connect(&candidate.id),
        None => warn!("{}: the simulated scan found nothing", extension_id),
    }

    let mut ticker = interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    for frame in 0..frames {
        ticker.tick().await;
        println!("{}", frame_line(&registry, extension, frame));
    }

    extension.disconnect();
    Ok(())
}

pub async fn run_command(command: Command, config: &BridgeConfig) -> Result<(), AppRunError> {
    match command {
        Command::Info { extension } => {
            println!("{}", info(extension.as_deref())?);
        },
        Command::Scan { extension, seconds } => {
            let duration = seconds.map(Duration::from_secs).unwrap_or_else(|| config.scan_duration());
            println!("{}", scan(&extension, duration).await?);
        },
        Command::Simulate { extension, frames } => {
            simulate(&extension, frames, config).await?;
        },
    }
    Ok(())
}
