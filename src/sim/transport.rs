use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::time::sleep;
use uuid::Uuid;

use crate::device::transport::{ConnectCallback, ScanRequest, Transport, TransportSocket};
use crate::device::types::Candidate;
use crate::error::DeviceError;

/// A transport whose every scan finds exactly one peripheral matching the requested name prefix.
pub struct SimTransport {
    connect_delay: Duration,
    runtime: Option<Handle>,
    sockets: Mutex<Vec<Arc<SimSocket>>>,
}

impl SimTransport {
    /// Connecting completes synchronously, inside `connect_peripheral`.
    pub fn new() -> Self {
        SimTransport {
            connect_delay: Duration::ZERO,
            runtime: None,
            sockets: Mutex::new(Vec::new()),
        }
    }

    /// Connecting completes on `runtime`, `connect_delay` after it was requested.
    pub fn with_connect_delay(connect_delay: Duration, runtime: Handle) -> Self {
        SimTransport {
            connect_delay,
            runtime: Some(runtime),
            sockets: Mutex::new(Vec::new()),
        }
    }

    /// Every socket handed out so far, oldest first.
    pub fn sockets(&self) -> Vec<Arc<SimSocket>> {
        self.sockets.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        SimTransport::new()
    }
}

impl Transport for SimTransport {
    fn scan(&self, request: ScanRequest, on_connect: ConnectCallback) -> Arc<dyn TransportSocket> {
        info!("Simulated scan for {:?}", request.name_prefix);

        let socket = Arc::new(SimSocket {
            candidate: Candidate {
                id: format!("sim-{}", request.name_prefix.to_lowercase()),
                name: format!("{} 0SIM0001", request.name_prefix),
                rssi: Some(-48),
            },
            request,
            on_connect: Arc::new(on_connect),
            connect_delay: self.connect_delay,
            runtime: self.runtime.clone(),
            connected: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicUsize::new(0)),
            disconnects: AtomicUsize::new(0),
            written: Mutex::new(Vec::new()),
        });

        self.sockets.lock().unwrap_or_else(PoisonError::into_inner).push(socket.clone());
        socket
    }
}

pub struct SimSocket {
    request: ScanRequest,
    candidate: Candidate,
    on_connect: Arc<ConnectCallback>,
    connect_delay: Duration,
    runtime: Option<Handle>,
    connected: Arc<AtomicBool>,
    // bumped by disconnect so that a delayed connect requested earlier does not complete afterwards
    generation: Arc<AtomicUsize>,
    disconnects: AtomicUsize,
    written: Mutex<Vec<(Uuid, Vec<u8>)>>,
}

impl SimSocket {
    pub fn request(&self) -> &ScanRequest {
        &self.request
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.written.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl TransportSocket for SimSocket {
    fn candidates(&self) -> Vec<Candidate> {
        vec![self.candidate.clone()]
    }

    fn connect_peripheral(&self, id: &str) {
        if id != self.candidate.id {
            warn!("Simulated socket has no peripheral {}", id);
            return;
        }

        let connected = self.connected.clone();
        let on_connect = self.on_connect.clone();

        match (&self.runtime, self.connect_delay.is_zero()) {
            (Some(runtime), false) => {
                let generation = self.generation.clone();
                let requested_at = generation.load(Ordering::SeqCst);
                let delay = self.connect_delay;

                runtime.spawn(async move {
                    sleep(delay).await;
                    if generation.load(Ordering::SeqCst) == requested_at {
                        connected.store(true, Ordering::SeqCst);
                        on_connect();
                    }
                });
            },
            _ => {
                connected.store(true, Ordering::SeqCst);
                on_connect();
            },
        }
    }

    fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!("Simulated peripheral {} disconnected", self.candidate.id);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, DeviceError> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected);
        }

        let written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(written.iter()
            .rev()
            .find(|(uuid, _)| *uuid == characteristic)
            .map(|(_, data)| data.clone())
            .unwrap_or_default())
    }

    async fn write(&self, characteristic: Uuid, data: &[u8], _with_response: bool) -> Result<(), DeviceError> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected);
        }

        self.written.lock().unwrap_or_else(PoisonError::into_inner).push((characteristic, data.to_vec()));
        Ok(())
    }

    async fn notifications(&self, _characteristic: Uuid) -> Result<BoxStream<'static, Vec<u8>>, DeviceError> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected);
        }

        // the simulated device produces values directly, nothing travels over the link
        Ok(stream::empty().boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::constants::{GODIRECT_COMMAND_UUID, GODIRECT_SERVICE_UUID};

    fn request() -> ScanRequest {
        ScanRequest { name_prefix: "GDX-TMP".to_string(), service_ids: vec![GODIRECT_SERVICE_UUID] }
    }

    #[test]
    fn connect_fires_the_callback() {
        let transport = SimTransport::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let socket = transport.scan(request(), Box::new(move || { calls2.fetch_add(1, Ordering::SeqCst); }));

        let candidates = socket.candidates();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].name.starts_with("GDX-TMP"));

        socket.connect_peripheral("not-a-peripheral");
        assert!(!socket.is_connected());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        socket.connect_peripheral(&candidates[0].id);
        assert!(socket.is_connected());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        socket.disconnect();
        assert!(!socket.is_connected());
        let sim_socket = &transport.sockets()[0];
        assert_eq!(sim_socket.disconnect_count(), 1);
        assert_eq!(sim_socket.request(), &request());
    }

    #[tokio::test]
    async fn delayed_connect_is_abandoned_by_disconnect() {
        let transport = SimTransport::with_connect_delay(Duration::from_millis(20), Handle::current());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let socket = transport.scan(request(), Box::new(move || { calls2.fetch_add(1, Ordering::SeqCst); }));

        let id = socket.candidates()[0].id.clone();
        socket.connect_peripheral(&id);
        socket.disconnect();
        sleep(Duration::from_millis(60)).await;
        assert!(!socket.is_connected());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn io_requires_a_connection() {
        let transport = SimTransport::new();
        let socket = transport.scan(request(), Box::new(|| {}));
        assert!(matches!(socket.write(GODIRECT_COMMAND_UUID, &[1, 2], true).await, Err(DeviceError::NotConnected)));

        let id = socket.candidates()[0].id.clone();
        socket.connect_peripheral(&id);
        socket.write(GODIRECT_COMMAND_UUID, &[1, 2], true).await.unwrap();
        assert_eq!(socket.read(GODIRECT_COMMAND_UUID).await.unwrap(), vec![1, 2]);
        assert_eq!(transport.sockets()[0].written(), vec![(GODIRECT_COMMAND_UUID, vec![1, 2])]);
    }
}
