use std::fmt;
use serde::Serialize;
use uuid::Uuid;

/// Lifecycle of a peripheral driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting,
    Configuring,
    Streaming,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Scanning => "scanning",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Configuring => "configuring",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Disconnected => "disconnected",
        };

        write!(f, "{}", result)
    }
}

/// How a peripheral is found and which GATT characteristics carry its measurement protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeripheralIdentity {
    pub name_prefix: &'static str,
    pub service_id: Uuid,
    pub command_channel_id: Uuid,
    pub response_channel_id: Uuid,
}

/// One measurement channel of a peripheral type.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSpec {
    pub number: u8,
    pub semantic_name: &'static str,
    /// Enabled by the bridge while configuring, when the profile uses `Enablement::Declared`.
    pub enabled_by_default: bool,
    pub raw_to_semantic: fn(f64) -> f64,
}

/// Which device channels are switched on before measurements start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enablement {
    /// Every channel the device reports, declared or not.
    All,
    /// Only the declared channels with `enabled_by_default`.
    Declared,
    /// Nothing; the device falls back to its own default channel at start.
    None,
}

#[derive(Debug, Clone, Copy)]
pub struct MeasurementConfig {
    pub sample_period_ms: u64,
    pub enablement: Enablement,
}

/// Static description of one peripheral type: everything the generic driver needs.
#[derive(Debug)]
pub struct PeripheralProfile {
    pub extension_id: &'static str,
    pub name: &'static str,
    pub identity: PeripheralIdentity,
    pub channels: &'static [ChannelSpec],
    pub measurement: MeasurementConfig,
}

impl PeripheralProfile {
    pub fn channel(&self, number: u8) -> Option<&ChannelSpec> {
        self.channels.iter().find(|spec| spec.number == number)
    }

    pub fn channel_index(&self, number: u8) -> Option<usize> {
        self.channels.iter().position(|spec| spec.number == number)
    }

    pub fn channel_by_name(&self, semantic_name: &str) -> Option<&ChannelSpec> {
        self.channels.iter().find(|spec| spec.semantic_name == semantic_name)
    }

    /// Whether the driver switches on `number` while configuring a device.
    pub fn should_enable(&self, number: u8) -> bool {
        match self.measurement.enablement {
            Enablement::All => true,
            Enablement::Declared => self.channel(number).map(|spec| spec.enabled_by_default).unwrap_or(false),
            Enablement::None => false,
        }
    }
}

/// A peripheral reported by a scan, which the user may pick to connect to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub rssi: Option<i16>,
}
