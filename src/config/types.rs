use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Settings of the bridge process. Fields missing from the file keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Period of one host frame; every reporter is polled once per frame.
    pub poll_interval_ms: u64,
    pub scan_seconds: u64,
    /// Delay between `connect` and the simulated peripheral reporting a connection.
    pub simulated_connect_delay_ms: u64,
}

impl BridgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_seconds)
    }

    pub fn simulated_connect_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_connect_delay_ms)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            poll_interval_ms: 33,
            scan_seconds: 5,
            simulated_connect_delay_ms: 200,
        }
    }
}
