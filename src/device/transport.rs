use std::sync::Arc;
use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::device::types::{Candidate, PeripheralIdentity};
use crate::error::DeviceError;

/// Which peripherals a scan should report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub name_prefix: String,
    /// Services the connected peripheral must offer. Peripherals do not have to advertise them.
    pub service_ids: Vec<Uuid>,
}

impl ScanRequest {
    pub fn for_identity(identity: &PeripheralIdentity) -> Self {
        ScanRequest {
            name_prefix: identity.name_prefix.to_string(),
            service_ids: vec![identity.service_id],
        }
    }
}

/// Invoked by a socket every time its connection to the selected peripheral completes.
pub type ConnectCallback = Box<dyn Fn() + Send + Sync>;

/// A wireless link abstraction that can start scans. Each scan yields a fresh socket.
pub trait Transport: Send + Sync {
    fn scan(&self, request: ScanRequest, on_connect: ConnectCallback) -> Arc<dyn TransportSocket>;
}

/// One scan session and, once a candidate has been selected, the connection to it.
///
/// Connection timeouts and retries belong to the implementation, not to its callers.
#[async_trait]
pub trait TransportSocket: Send + Sync {
    fn candidates(&self) -> Vec<Candidate>;

    fn connect_peripheral(&self, id: &str);

    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, DeviceError>;

    async fn write(&self, characteristic: Uuid, data: &[u8], with_response: bool) -> Result<(), DeviceError>;

    async fn notifications(&self, characteristic: Uuid) -> Result<BoxStream<'static, Vec<u8>>, DeviceError>;
}
