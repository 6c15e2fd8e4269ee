use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::BoxStream;
use futures::StreamExt;
use indexmap::IndexMap;
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::constants::{CONNECTION_POLL_DELAY, IS_CONNECTED_DEADLINE, SCAN_POLL_DELAY, WRITE_DEADLINE};
use crate::device::transport::{ConnectCallback, ScanRequest, Transport, TransportSocket};
use crate::device::types::Candidate;
use crate::error::DeviceError;

/// Bluetooth LE transport backed by btleplug, scanning on every adapter of the system.
pub struct BtleTransport {
    runtime: Handle,
}

impl BtleTransport {
    pub fn new(runtime: Handle) -> Self {
        BtleTransport { runtime }
    }
}

impl Transport for BtleTransport {
    fn scan(&self, request: ScanRequest, on_connect: ConnectCallback) -> Arc<dyn TransportSocket> {
        let inner = Arc::new(SocketInner {
            request,
            on_connect,
            runtime: self.runtime.clone(),
            cancel: CancellationToken::new(),
            candidates: Mutex::new(IndexMap::new()),
            link: LinkSlot::new(),
        });

        self.runtime.spawn(scan_task(inner.clone()));
        Arc::new(BtleSocket { inner })
    }
}

/// The connected peripheral of a socket. Publishing and taking happen under one lock, so a
/// disconnect either sees the published peripheral or makes the publish fail.
struct LinkSlot<P> {
    peripheral: Mutex<Option<P>>,
    connected: AtomicBool,
}

impl<P: Clone> LinkSlot<P> {
    fn new() -> Self {
        LinkSlot { peripheral: Mutex::new(None), connected: AtomicBool::new(false) }
    }

    fn lock(&self) -> MutexGuard<'_, Option<P>> {
        self.peripheral.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `peripheral` as connected, unless `cancel` fired; then it is handed back.
    fn publish(&self, cancel: &CancellationToken, peripheral: P) -> Result<(), P> {
        let mut slot = self.lock();
        if cancel.is_cancelled() {
            return Err(peripheral);
        }
        *slot = Some(peripheral);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn take(&self) -> Option<P> {
        let mut slot = self.lock();
        self.connected.store(false, Ordering::SeqCst);
        slot.take()
    }

    fn mark_lost(&self) {
        let _slot = self.lock();
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connected_peripheral(&self) -> Result<P, DeviceError> {
        let slot = self.lock();
        if !self.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        slot.clone().ok_or(DeviceError::NotConnected)
    }
}

struct SocketInner {
    request: ScanRequest,
    on_connect: ConnectCallback,
    runtime: Handle,
    // cancelled by disconnect; stops scanning and the connection watch
    cancel: CancellationToken,
    candidates: Mutex<IndexMap<String, (Peripheral, Candidate)>>,
    link: LinkSlot<Peripheral>,
}

impl SocketInner {
    fn lock_candidates(&self) -> MutexGuard<'_, IndexMap<String, (Peripheral, Candidate)>> {
        self.candidates.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct BtleSocket {
    inner: Arc<SocketInner>,
}

fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Result<Characteristic, DeviceError> {
    peripheral.characteristics()
        .into_iter()
        .find(|characteristic| characteristic.uuid == uuid)
        .ok_or(DeviceError::MissingCharacteristic)
}

#[async_trait]
impl TransportSocket for BtleSocket {
    fn candidates(&self) -> Vec<Candidate> {
        self.inner.lock_candidates().values().map(|(_, candidate)| candidate.clone()).collect()
    }

    fn connect_peripheral(&self, id: &str) {
        let peripheral = match self.inner.lock_candidates().get(id) {
            Some((peripheral, _)) => peripheral.clone(),
            None => {
                warn!("{}", DeviceError::UnknownPeripheral(id.to_string()));
                return;
            },
        };

        self.inner.runtime.spawn(connect_task(self.inner.clone(), peripheral));
    }

    fn disconnect(&self) {
        self.inner.cancel.cancel();

        if let Some(peripheral) = self.inner.link.take() {
            self.inner.runtime.spawn(async move {
                disconnect_peripheral(&peripheral).await;
            });
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.link.is_connected()
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, DeviceError> {
        let peripheral = self.inner.link.connected_peripheral()?;
        let characteristic = find_characteristic(&peripheral, characteristic)?;
        Ok(peripheral.read(&characteristic).await?)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8], with_response: bool) -> Result<(), DeviceError> {
        let peripheral = self.inner.link.connected_peripheral()?;
        let characteristic = find_characteristic(&peripheral, characteristic)?;
        let write_type = if with_response { WriteType::WithResponse } else { WriteType::WithoutResponse };

        let fut = peripheral.write(&characteristic, data, write_type);

        tokio::select! {
            _ = sleep(Duration::from_millis(WRITE_DEADLINE)) => {
                warn!("Sending to characteristic {} took too long", characteristic.uuid);
                Err(DeviceError::Timeout)
            }
            result = fut => Ok(result?),
        }
    }

    async fn notifications(&self, characteristic: Uuid) -> Result<BoxStream<'static, Vec<u8>>, DeviceError> {
        let peripheral = self.inner.link.connected_peripheral()?;
        let characteristic = find_characteristic(&peripheral, characteristic)?;

        info!("Subscribing to characteristic {:?} {:?}", characteristic.service_uuid, characteristic.uuid);
        peripheral.subscribe(&characteristic).await?;

        let uuid = characteristic.uuid;
        let stream = peripheral.notifications().await?
            .filter(move |notification| futures::future::ready(notification.uuid == uuid))
            .map(|notification| notification.value);

        Ok(stream.boxed())
    }
}

async fn start_scanning(manager: &Manager) -> Result<Vec<Adapter>, DeviceError> {
    let adapters = manager.adapters().await?;

    // the requested services are not necessarily advertised, so only the name prefix can filter the scan
    let filter = ScanFilter::default();

    for adapter in &adapters {
        info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        adapter.start_scan(filter.clone()).await?;
    }

    Ok(adapters)
}

fn matches_request(request: &ScanRequest, properties: &PeripheralProperties) -> bool {
    properties.local_name.as_deref()
        .map(|name| name.starts_with(request.name_prefix.as_str()))
        .unwrap_or(false)
}

async fn update_candidates(inner: &SocketInner, adapters: &[Adapter]) {
    for adapter in adapters {
        let peripherals = match adapter.peripherals().await {
            Ok(v) => v,
            Err(err) => {
                warn!("Failed to query BLE adapter for peripherals: {}", err);
                continue;
            },
        };

        for peripheral in peripherals {
            match peripheral.properties().await {
                Err(err) => {
                    warn!("Could not query peripheral for properties: {:?}", err);
                },
                Ok(None) => {
                    debug!("Peripheral has no properties");
                },
                Ok(Some(properties)) => {
                    if !matches_request(&inner.request, &properties) {
                        continue;
                    }

                    let id = format!("{:?}", peripheral.id());
                    let candidate = Candidate {
                        id: id.clone(),
                        name: properties.local_name.clone().unwrap_or(String::from("NONE")),
                        rssi: properties.rssi,
                    };

                    let mut candidates = inner.lock_candidates();
                    if !candidates.contains_key(&id) {
                        info!(
                            "Found peripheral {} {:?} {} {:?}",
                            properties.address,
                            properties.address_type,
                            candidate.name,
                            properties.services,
                        );
                    }
                    candidates.insert(id, (peripheral, candidate));
                },
            }
        }
    }
}

async fn scan_task(inner: Arc<SocketInner>) {
    let manager = match Manager::new().await {
        Ok(manager) => manager,
        Err(err) => {
            warn!("Failed to create BLE manager: {:?}", err);
            return;
        },
    };

    let adapters = match start_scanning(&manager).await {
        Ok(adapters) => adapters,
        Err(err) => {
            warn!("Scanning failed {:?}", err);
            return;
        },
    };

    'mainloop: loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => {
                break 'mainloop;
            },
            _ = sleep(Duration::from_millis(SCAN_POLL_DELAY)) => {
                update_candidates(&inner, &adapters).await;
            },
        }
    }

    for adapter in &adapters {
        if let Err(err) = adapter.stop_scan().await {
            debug!("Failed to stop scanning: {:?}", err);
        }
    }
}

async fn connect_peripheral(peripheral: &Peripheral, request: &ScanRequest) -> Result<(), DeviceError> {
    info!("Connecting to peripheral...");
    peripheral.connect().await?;

    info!("Connected; Discovering services...");
    peripheral.discover_services().await?;

    let services = peripheral.services();
    let has_service = request.service_ids.iter()
        .all(|uuid| services.iter().any(|service| service.uuid == *uuid));

    if !has_service {
        return Err(DeviceError::MissingService);
    }

    Ok(())
}

async fn disconnect_peripheral(peripheral: &Peripheral) {
    info!("Disconnecting from peripheral...");
    if let Err(err) = peripheral.disconnect().await {
        warn!("Failed to disconnect from peripheral: {:?}", err);
    }
}

async fn connect_task(inner: Arc<SocketInner>, peripheral: Peripheral) {
    let result = tokio::select! {
        _ = inner.cancel.cancelled() => {
            // disconnect() was called while connecting; the link may already be up
            disconnect_peripheral(&peripheral).await;
            return;
        },
        result = connect_peripheral(&peripheral, &inner.request) => result,
    };

    if let Err(err) = result {
        warn!("Connecting to peripheral failed: {:?}", err);
        disconnect_peripheral(&peripheral).await;
        return;
    }

    if let Err(peripheral) = inner.link.publish(&inner.cancel, peripheral.clone()) {
        disconnect_peripheral(&peripheral).await;
        return;
    }

    info!("Peripheral ready");
    (inner.on_connect)();

    'mainloop: loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => {
                break 'mainloop;
            },
            _ = sleep(Duration::from_millis(CONNECTION_POLL_DELAY)) => {},
        }

        tokio::select! {
            _ = sleep(Duration::from_millis(IS_CONNECTED_DEADLINE)) => {
                // macOS
                warn!("Checking for connection status took too long");
            }
            result = peripheral.is_connected() => match result {
                Err(err) => {
                    warn!("Error checking for connection state: {:?}", err);
                },
                Ok(false) => {
                    warn!("Connection lost");
                    inner.link.mark_lost();
                    break 'mainloop;
                },
                Ok(true) => {},
            }
        }
    }
}
