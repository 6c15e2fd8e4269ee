use std::sync::Arc;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::device::transport::TransportSocket;
use crate::device::types::PeripheralIdentity;
use crate::error::DeviceError;

/// How a measurement device is brought up after the link is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceOptions {
    pub open: bool,
    pub start_measurements: bool,
    /// Whether the device keeps a history of samples besides the latest one.
    pub keep_values: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        DeviceOptions {
            open: true,
            start_measurements: false,
            keep_values: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorChannel {
    pub number: u8,
    pub enabled: bool,
    pub value: f64,
}

/// Translates transport reads/writes/notifications into a vendor measurement protocol.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    async fn create_device(
        &self,
        socket: Arc<dyn TransportSocket>,
        identity: &PeripheralIdentity,
        options: DeviceOptions,
    ) -> Result<Box<dyn MeasurementDevice>, DeviceError>;
}

/// A measurement device opened by a `ProtocolAdapter`.
///
/// Every stream handed out ends when the device is dropped, which is how listeners are torn down.
pub trait MeasurementDevice: Send {
    fn sensors(&self) -> Vec<SensorChannel>;

    fn set_enabled(&mut self, number: u8, enabled: bool);

    /// Yields once each time measurements (re)start. The enabled channels are final at that point.
    fn measurements_started(&mut self) -> BoxStream<'static, ()>;

    /// Raw readings of channel `number`.
    fn value_changed(&mut self, number: u8) -> BoxStream<'static, f64>;

    fn start(&mut self, period_ms: u64);

    fn stop(&mut self);
}
