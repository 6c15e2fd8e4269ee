use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use futures::channel::mpsc::{unbounded, UnboundedReceiver};
use futures::stream::{self, BoxStream, SelectAll};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::device::cache::SensorCache;
use crate::device::protocol::{DeviceOptions, MeasurementDevice, ProtocolAdapter};
use crate::device::transport::{ConnectCallback, ScanRequest, Transport, TransportSocket};
use crate::device::translator::apply_value;
use crate::device::types::{Candidate, ConnectionState, PeripheralProfile};
use crate::error::DeviceError;

/// The collaborators a driver orchestrates, shared by every driver of a process.
#[derive(Clone)]
pub struct DriverContext {
    pub transport: Arc<dyn Transport>,
    pub protocol: Arc<dyn ProtocolAdapter>,
    // connection completion and measurement events are handled on this runtime
    pub runtime: Handle,
}

impl DriverContext {
    pub fn new(transport: Arc<dyn Transport>, protocol: Arc<dyn ProtocolAdapter>, runtime: Handle) -> Self {
        DriverContext { transport, protocol, runtime }
    }
}

struct Shared {
    profile: &'static PeripheralProfile,
    state: Mutex<ConnectionState>,
    cache: SensorCache,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: &mut ConnectionState, to: ConnectionState) {
        if *state != to {
            info!("{}: {} -> {}", self.profile.extension_id, *state, to);
            *state = to;
        }
    }

    // Transitions requested by a session task are dropped once that session has been cancelled, so a
    // stale task can never overwrite the state (or the cache) of a newer session.
    fn transition(&self, cancel: &CancellationToken, to: ConnectionState) -> bool {
        let mut state = self.lock_state();
        if cancel.is_cancelled() {
            return false;
        }
        self.set_state(&mut state, to);
        true
    }

    fn apply(&self, cancel: &CancellationToken, number: u8, raw: f64) {
        let _state = self.lock_state();
        if cancel.is_cancelled() {
            return;
        }
        apply_value(&self.cache, number, raw);
    }
}

struct Session {
    socket: Arc<dyn TransportSocket>,
    cancel: CancellationToken,
}

/// Connection state machine, channel configuration and value cache of one peripheral type.
///
/// The host facing methods (`scan`, `connect`, `disconnect`, `is_connected` and the cache readers) never
/// block on the transport and never fail: a missing socket turns them into no-ops.
pub struct PeripheralDriver {
    context: DriverContext,
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
}

impl PeripheralDriver {
    pub fn new(profile: &'static PeripheralProfile, context: DriverContext) -> Self {
        let shared = Shared {
            profile,
            state: Mutex::new(ConnectionState::Idle),
            cache: SensorCache::new(profile),
        };

        PeripheralDriver {
            context,
            shared: Arc::new(shared),
            session: Mutex::new(None),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn profile(&self) -> &'static PeripheralProfile {
        self.shared.profile
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.lock_state()
    }

    pub fn cache(&self) -> &SensorCache {
        &self.shared.cache
    }

    /// Cached semantic value of channel `number`, 0 until a reading arrives.
    pub fn value(&self, number: u8) -> f64 {
        self.shared.cache.get(number)
    }

    /// Closes any previous socket, then starts a new scan with this peripheral type's filter.
    pub fn scan(&self) {
        let mut session = self.lock_session();
        if let Some(previous) = session.take() {
            info!("{}: closing previous socket before scanning", self.shared.profile.extension_id);
            self.end_session(&previous);
        }

        let request = ScanRequest::for_identity(&self.shared.profile.identity);

        let (connect_sender, connect_receiver) = unbounded::<()>();
        let on_connect: ConnectCallback = Box::new(move || {
            // the receiver is gone once the session has ended; nothing left to notify then
            let _ = connect_sender.unbounded_send(());
        });

        let socket = self.context.transport.scan(request, on_connect);
        let cancel = CancellationToken::new();

        {
            let mut state = self.shared.lock_state();
            self.shared.set_state(&mut state, ConnectionState::Scanning);
        }

        self.context.runtime.spawn(run_session(
            self.shared.clone(),
            self.context.protocol.clone(),
            socket.clone(),
            cancel.clone(),
            connect_receiver,
        ));

        *session = Some(Session { socket, cancel });
    }

    /// Asks the current socket to connect to the scanned peripheral `id`.
    ///
    /// Only a scanning (or still connecting) driver connects; once a device is being set up or streams,
    /// the call is ignored.
    pub fn connect(&self, id: &str) {
        let session = self.lock_session();
        let Some(session) = session.as_ref() else {
            debug!("{}: connect({}) without a scan, ignoring", self.shared.profile.extension_id, id);
            return;
        };

        {
            let mut state = self.shared.lock_state();
            if session.cancel.is_cancelled() {
                debug!("{}: connect({}) after disconnect, a new scan is needed", self.shared.profile.extension_id, id);
                return;
            }
            if !matches!(*state, ConnectionState::Scanning | ConnectionState::Connecting) {
                debug!("{}: connect({}) while {}, ignoring", self.shared.profile.extension_id, id, *state);
                return;
            }
            self.shared.set_state(&mut state, ConnectionState::Connecting);
        }

        info!("{}: connecting to {}", self.shared.profile.extension_id, id);
        session.socket.connect_peripheral(id);
    }

    /// Resets every cached value and closes the socket. Safe to call at any time, any number of times.
    pub fn disconnect(&self) {
        let session = self.lock_session();
        match session.as_ref() {
            Some(session) => self.end_session(session),
            None => {
                let mut state = self.shared.lock_state();
                self.shared.set_state(&mut state, ConnectionState::Disconnected);
                self.shared.cache.reset();
            },
        }
    }

    pub fn is_connected(&self) -> bool {
        match self.lock_session().as_ref() {
            Some(session) => session.socket.is_connected(),
            None => false,
        }
    }

    /// Peripherals reported by the current scan.
    pub fn candidates(&self) -> Vec<Candidate> {
        match self.lock_session().as_ref() {
            Some(session) => session.socket.candidates(),
            None => Vec::new(),
        }
    }

    fn end_session(&self, session: &Session) {
        {
            let mut state = self.shared.lock_state();
            // cancelling drops the session's device, and with it every value listener
            session.cancel.cancel();
            self.shared.set_state(&mut state, ConnectionState::Disconnected);
            self.shared.cache.reset();
        }
        session.socket.disconnect();
    }
}

impl Drop for PeripheralDriver {
    fn drop(&mut self) {
        if let Some(session) = self.lock_session().take() {
            session.cancel.cancel();
            session.socket.disconnect();
        }
    }
}

enum StreamEnd {
    Cancelled,
    Reconnected,
}

async fn run_session(
    shared: Arc<Shared>,
    protocol: Arc<dyn ProtocolAdapter>,
    socket: Arc<dyn TransportSocket>,
    cancel: CancellationToken,
    mut connect_receiver: UnboundedReceiver<()>,
) {
    let extension_id = shared.profile.extension_id;

    'mainloop: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            signal = connect_receiver.next() => {
                if signal.is_none() {
                    break 'mainloop;
                }
            },
        }

        loop {
            match stream_device(&shared, protocol.as_ref(), socket.clone(), &cancel, &mut connect_receiver).await {
                Ok(StreamEnd::Cancelled) => break 'mainloop,
                Ok(StreamEnd::Reconnected) => {
                    info!("{}: socket reconnected, setting up the device again", extension_id);
                },
                Err(err) => {
                    warn!("{}: setting up the device failed: {}", extension_id, err);
                    shared.transition(&cancel, ConnectionState::Connecting);
                    continue 'mainloop;
                },
            }
        }
    }

    debug!("{}: session ended", extension_id);
}

async fn stream_device(
    shared: &Shared,
    protocol: &dyn ProtocolAdapter,
    socket: Arc<dyn TransportSocket>,
    cancel: &CancellationToken,
    connect_receiver: &mut UnboundedReceiver<()>,
) -> Result<StreamEnd, DeviceError> {
    let profile = shared.profile;

    if !shared.transition(cancel, ConnectionState::Configuring) {
        return Ok(StreamEnd::Cancelled);
    }

    let mut device = tokio::select! {
        _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
        device = protocol.create_device(socket, &profile.identity, DeviceOptions::default()) => device?,
    };

    for sensor in device.sensors() {
        device.set_enabled(sensor.number, profile.should_enable(sensor.number));
    }

    let mut started = device.measurements_started();
    device.start(profile.measurement.sample_period_ms);

    let mut values: SelectAll<BoxStream<'static, (u8, f64)>> = SelectAll::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                device.stop();
                return Ok(StreamEnd::Cancelled);
            },
            Some(()) = connect_receiver.next() => {
                device.stop();
                return Ok(StreamEnd::Reconnected);
            },
            Some(()) = started.next() => {
                // the device decides which channels are active only now, so listen again on every start
                values = subscribe_enabled(device.as_mut());
                if !shared.transition(cancel, ConnectionState::Streaming) {
                    device.stop();
                    return Ok(StreamEnd::Cancelled);
                }
            },
            Some((number, raw)) = values.next() => {
                shared.apply(cancel, number, raw);
            },
        }
    }
}

fn subscribe_enabled(device: &mut dyn MeasurementDevice) -> SelectAll<BoxStream<'static, (u8, f64)>> {
    let enabled: Vec<u8> = device.sensors()
        .into_iter()
        .filter(|sensor| sensor.enabled)
        .map(|sensor| sensor.number)
        .collect();

    debug!("Listening for values on channels {:?}", enabled);

    stream::select_all(enabled.into_iter().map(|number| {
        device.value_changed(number).map(move |raw| (number, raw)).boxed()
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use super::*;
    use crate::device::constants::*;
    use crate::device::profiles::{GDX3MG, GDXMD, GDXTMP, MAG_FIELD_X};
    use crate::sim::device::SimProtocol;
    use crate::sim::transport::SimTransport;

    struct Fixture {
        driver: PeripheralDriver,
        transport: Arc<SimTransport>,
        protocol: Arc<SimProtocol>,
    }

    fn fixture(profile: &'static PeripheralProfile) -> Fixture {
        let transport = Arc::new(SimTransport::new());
        let protocol = Arc::new(SimProtocol::manual());
        let context = DriverContext::new(transport.clone(), protocol.clone(), Handle::current());
        Fixture { driver: PeripheralDriver::new(profile, context), transport, protocol }
    }

    async fn eventually<F: Fn() -> bool>(what: &str, condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {}", what);
    }

    async fn stream(fixture: &Fixture) {
        fixture.driver.scan();
        let candidate = fixture.driver.candidates().remove(0);
        fixture.driver.connect(&candidate.id);
        eventually("streaming", || fixture.driver.state() == ConnectionState::Streaming).await;
    }

    #[tokio::test]
    async fn idle_driver_is_tolerant() {
        let fixture = fixture(&GDX3MG);
        assert_eq!(fixture.driver.state(), ConnectionState::Idle);
        assert!(!fixture.driver.is_connected());
        assert!(fixture.driver.candidates().is_empty());

        // no socket yet: connect is a no-op
        fixture.driver.connect("nothing");
        assert_eq!(fixture.driver.state(), ConnectionState::Idle);

        fixture.driver.disconnect();
        fixture.driver.disconnect();
        assert_eq!(fixture.driver.state(), ConnectionState::Disconnected);
        assert!(fixture.driver.cache().snapshot().iter().all(|(_, value)| *value == 0.0));
    }

    #[tokio::test]
    async fn connects_and_streams_values() {
        let fixture = fixture(&GDX3MG);
        stream(&fixture).await;
        assert!(fixture.driver.is_connected());

        let device = fixture.protocol.last_device().unwrap();
        assert_eq!(device.period_ms(), Some(GDX3MG_MEASUREMENT_PERIOD));
        assert!(device.sensors().iter().all(|sensor| sensor.enabled));

        device.emit(GDX3MG_MAGNETIC_FIELD_X, 0.02);
        eventually("magFieldX", || fixture.driver.cache().get_by_name(MAG_FIELD_X) != 0.0).await;
        assert!((fixture.driver.value(GDX3MG_MAGNETIC_FIELD_X) - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn disabled_motion_channels_are_not_cached() {
        let fixture = fixture(&GDXMD);
        stream(&fixture).await;

        let device = fixture.protocol.last_device().unwrap();
        let enabled: Vec<u8> = device.sensors().iter().filter(|s| s.enabled).map(|s| s.number).collect();
        assert_eq!(enabled, vec![GDXMD_POSITION_CART]);

        device.emit(GDXMD_POSITION, 1.0);
        device.emit(GDXMD_POSITION_TC, 1.0);
        device.emit(GDXMD_POSITION_CART, 0.5);
        eventually("positionCart", || fixture.driver.value(GDXMD_POSITION_CART) != 0.0).await;

        assert_eq!(fixture.driver.value(GDXMD_POSITION), 0.0);
        assert_eq!(fixture.driver.value(GDXMD_POSITION_TC), 0.0);
    }

    #[tokio::test]
    async fn temperature_streams_the_device_default_channel() {
        let fixture = fixture(&GDXTMP);
        stream(&fixture).await;

        let device = fixture.protocol.last_device().unwrap();
        device.emit(GDXTMP_TEMPERATURE, 23.5);
        eventually("temperature", || fixture.driver.value(GDXTMP_TEMPERATURE) == 23.5).await;
    }

    #[tokio::test]
    async fn restarting_measurements_subscribes_again() {
        let fixture = fixture(&GDXMD);
        stream(&fixture).await;

        let device = fixture.protocol.last_device().unwrap();
        assert_eq!(device.subscription_count(GDXMD_POSITION_CART), 1);
        device.restart();
        eventually("second subscription", || device.subscription_count(GDXMD_POSITION_CART) == 2).await;
        device.emit(GDXMD_POSITION_CART, 0.2);
        eventually("positionCart", || fixture.driver.value(GDXMD_POSITION_CART) != 0.0).await;
        assert!((fixture.driver.value(GDXMD_POSITION_CART) - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn disconnect_resets_every_channel_and_drops_listeners() {
        let fixture = fixture(&GDXMD);
        stream(&fixture).await;
        let device = fixture.protocol.last_device().unwrap();
        device.emit(GDXMD_POSITION_CART, 0.5);
        eventually("positionCart", || fixture.driver.value(GDXMD_POSITION_CART) != 0.0).await;

        fixture.driver.disconnect();
        assert_eq!(fixture.driver.state(), ConnectionState::Disconnected);
        assert!(!fixture.driver.is_connected());
        assert!(fixture.driver.cache().snapshot().iter().all(|(_, value)| *value == 0.0));

        eventually("device dropped", || !device.is_alive()).await;
        assert_eq!(device.stop_count(), 1);
        device.emit(GDXMD_POSITION_CART, 0.5);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fixture.driver.value(GDXMD_POSITION_CART), 0.0);

        fixture.driver.disconnect();
        assert_eq!(fixture.driver.state(), ConnectionState::Disconnected);
        assert!(fixture.driver.cache().snapshot().iter().all(|(_, value)| *value == 0.0));
    }

    #[tokio::test]
    async fn connect_while_streaming_is_ignored() {
        let fixture = fixture(&GDXMD);
        stream(&fixture).await;
        let socket = fixture.transport.sockets().remove(0);

        fixture.driver.connect("sim-unknown");
        let candidate = fixture.driver.candidates().remove(0);
        fixture.driver.connect(&candidate.id);
        assert_eq!(fixture.driver.state(), ConnectionState::Streaming);
        assert!(fixture.driver.is_connected());
        assert_eq!(fixture.protocol.device_count(), 1);
        assert_eq!(socket.disconnect_count(), 0);

        let device = fixture.protocol.last_device().unwrap();
        device.emit(GDXMD_POSITION_CART, 0.5);
        eventually("positionCart", || fixture.driver.value(GDXMD_POSITION_CART) != 0.0).await;
        assert!((fixture.driver.value(GDXMD_POSITION_CART) - 50.0).abs() < 1e-9);
        assert_eq!(fixture.driver.state(), ConnectionState::Streaming);
    }

    #[tokio::test]
    async fn connect_is_retried_while_connecting() {
        let fixture = fixture(&GDXTMP);
        fixture.protocol.fail_next_device();
        fixture.driver.scan();
        let candidate = fixture.driver.candidates().remove(0);
        fixture.driver.connect(&candidate.id);
        eventually("connecting", || {
            fixture.protocol.attempt_count() == 1 && fixture.driver.state() == ConnectionState::Connecting
        }).await;

        fixture.driver.connect(&candidate.id);
        eventually("streaming", || fixture.driver.state() == ConnectionState::Streaming).await;
        assert_eq!(fixture.protocol.device_count(), 1);
    }

    #[tokio::test]
    async fn scanning_again_closes_the_previous_socket() {
        let fixture = fixture(&GDX3MG);
        stream(&fixture).await;
        let first = fixture.transport.sockets().remove(0);
        assert!(first.is_connected());

        fixture.driver.scan();
        assert_eq!(fixture.driver.state(), ConnectionState::Scanning);
        assert!(!first.is_connected());
        assert_eq!(first.disconnect_count(), 1);
        assert_eq!(fixture.transport.sockets().len(), 2);
        assert!(!fixture.driver.is_connected());

        // the new socket works on its own
        let candidate = fixture.driver.candidates().remove(0);
        fixture.driver.connect(&candidate.id);
        eventually("streaming", || fixture.driver.state() == ConnectionState::Streaming).await;
        assert_eq!(fixture.protocol.device_count(), 2);
    }

    #[tokio::test]
    async fn failed_device_setup_falls_back_to_connecting() {
        let fixture = fixture(&GDXTMP);
        fixture.protocol.fail_next_device();
        fixture.driver.scan();
        let candidate = fixture.driver.candidates().remove(0);
        fixture.driver.connect(&candidate.id);

        eventually("device setup attempt", || fixture.protocol.attempt_count() == 1).await;
        eventually("connecting", || fixture.driver.state() == ConnectionState::Connecting).await;
        assert_eq!(fixture.protocol.device_count(), 0);
        assert!(fixture.driver.cache().snapshot().iter().all(|(_, value)| *value == 0.0));
    }
}
