use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, info};
use tokio::runtime::Handle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::device::profiles::PROFILES;
use crate::device::protocol::{DeviceOptions, MeasurementDevice, ProtocolAdapter, SensorChannel};
use crate::device::transport::TransportSocket;
use crate::device::types::{PeripheralIdentity, PeripheralProfile};
use crate::error::DeviceError;
use crate::sim::signal::raw_sample;

/// A measurement protocol that fabricates devices instead of talking to real hardware.
///
/// In manual mode values only appear through `SimDeviceHandle::emit`; in waveform mode every started
/// device also reports `raw_sample` values for its enabled channels at the requested period.
pub struct SimProtocol {
    waveform: Option<Handle>,
    devices: Mutex<Vec<SimDeviceHandle>>,
    attempts: AtomicUsize,
    fail_next: AtomicBool,
}

impl SimProtocol {
    pub fn manual() -> Self {
        SimProtocol {
            waveform: None,
            devices: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn waveform(runtime: Handle) -> Self {
        SimProtocol {
            waveform: Some(runtime),
            ..SimProtocol::manual()
        }
    }

    fn lock_devices(&self) -> MutexGuard<'_, Vec<SimDeviceHandle>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The most recently created device.
    pub fn last_device(&self) -> Option<SimDeviceHandle> {
        self.lock_devices().last().cloned()
    }

    pub fn device_count(&self) -> usize {
        self.lock_devices().len()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Makes the next `create_device` fail, as if opening the device timed out.
    pub fn fail_next_device(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProtocolAdapter for SimProtocol {
    async fn create_device(
        &self,
        socket: Arc<dyn TransportSocket>,
        identity: &PeripheralIdentity,
        options: DeviceOptions,
    ) -> Result<Box<dyn MeasurementDevice>, DeviceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(DeviceError::Protocol("simulated device did not answer".to_string()));
        }
        if !socket.is_connected() {
            return Err(DeviceError::NotConnected);
        }

        let profile = PROFILES.iter()
            .copied()
            .find(|profile| profile.identity == *identity)
            .ok_or_else(|| DeviceError::Protocol(format!("no simulated device for {}", identity.name_prefix)))?;

        let device = SimDevice::new(profile, self.waveform.clone(), options);
        self.lock_devices().push(device.handle());

        info!("Simulated {} device opened", profile.identity.name_prefix);
        Ok(Box::new(device))
    }
}

struct SimDeviceState {
    sensors: Vec<SensorChannel>,
    started_listeners: Vec<UnboundedSender<()>>,
    value_listeners: Vec<(u8, UnboundedSender<f64>)>,
    subscriptions: Vec<u8>,
    period_ms: Option<u64>,
    // explicit stop requests, not counting the stop on drop
    stops: usize,
    alive: bool,
    waveform_cancel: Option<CancellationToken>,
}

impl SimDeviceState {
    fn emit(&mut self, number: u8, raw: f64) {
        if let Some(sensor) = self.sensors.iter_mut().find(|sensor| sensor.number == number) {
            sensor.value = raw;
        }
        self.value_listeners.retain(|(listener_number, sender)| {
            *listener_number != number || sender.unbounded_send(raw).is_ok()
        });
    }

    fn start(&mut self, default_sensor: u8, period_ms: u64) {
        // same as the vendor library: a device started without any enabled sensor streams its default one
        if !self.sensors.iter().any(|sensor| sensor.enabled) {
            if let Some(sensor) = self.sensors.iter_mut().find(|sensor| sensor.number == default_sensor) {
                sensor.enabled = true;
            }
        }

        self.period_ms = Some(period_ms);
        self.started_listeners.retain(|sender| sender.unbounded_send(()).is_ok());
    }

    fn stop(&mut self) {
        self.period_ms = None;
        if let Some(cancel) = self.waveform_cancel.take() {
            cancel.cancel();
        }
    }
}

/// Control over a simulated device from outside the driver that owns it.
#[derive(Clone)]
pub struct SimDeviceHandle {
    profile: &'static PeripheralProfile,
    default_sensor: u8,
    state: Arc<Mutex<SimDeviceState>>,
}

impl SimDeviceHandle {
    fn lock(&self) -> MutexGuard<'_, SimDeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn profile(&self) -> &'static PeripheralProfile {
        self.profile
    }

    /// Reports a raw reading on `number`, whether or not that channel is enabled.
    pub fn emit(&self, number: u8, raw: f64) {
        self.lock().emit(number, raw);
    }

    /// Restarts measurements with the current period, which fires measurements-started again.
    pub fn restart(&self) {
        let mut state = self.lock();
        if let Some(period_ms) = state.period_ms {
            state.start(self.default_sensor, period_ms);
        }
    }

    pub fn sensors(&self) -> Vec<SensorChannel> {
        self.lock().sensors.clone()
    }

    pub fn period_ms(&self) -> Option<u64> {
        self.lock().period_ms
    }

    /// How many times a listener was registered for `number` over the device lifetime.
    pub fn subscription_count(&self, number: u8) -> usize {
        self.lock().subscriptions.iter().filter(|subscribed| **subscribed == number).count()
    }

    pub fn stop_count(&self) -> usize {
        self.lock().stops
    }

    /// False once the owning driver dropped the device.
    pub fn is_alive(&self) -> bool {
        self.lock().alive
    }
}

pub struct SimDevice {
    handle: SimDeviceHandle,
    waveform: Option<Handle>,
}

impl SimDevice {
    pub fn new(profile: &'static PeripheralProfile, waveform: Option<Handle>, options: DeviceOptions) -> Self {
        debug!("Creating simulated device with {:?}", options);

        let sensors = profile.channels.iter()
            .map(|spec| SensorChannel { number: spec.number, enabled: false, value: 0.0 })
            .collect();

        let state = SimDeviceState {
            sensors,
            started_listeners: Vec::new(),
            value_listeners: Vec::new(),
            subscriptions: Vec::new(),
            period_ms: None,
            stops: 0,
            alive: true,
            waveform_cancel: None,
        };

        let handle = SimDeviceHandle {
            profile,
            default_sensor: profile.channels.first().map(|spec| spec.number).unwrap_or(1),
            state: Arc::new(Mutex::new(state)),
        };

        let mut device = SimDevice { handle, waveform };
        if options.start_measurements {
            device.start(profile.measurement.sample_period_ms);
        }
        device
    }

    pub fn handle(&self) -> SimDeviceHandle {
        self.handle.clone()
    }

    fn spawn_waveform(&self, runtime: &Handle, period_ms: u64) -> CancellationToken {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = self.handle.clone();

        runtime.spawn(async move {
            let started = Instant::now();
            let mut ticks = interval(Duration::from_millis(period_ms.max(1)));

            'mainloop: loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        break 'mainloop;
                    },
                    _ = ticks.tick() => {
                        let t = started.elapsed().as_secs_f64();
                        let mut state = handle.lock();
                        let enabled: Vec<u8> = state.sensors.iter()
                            .filter(|sensor| sensor.enabled)
                            .map(|sensor| sensor.number)
                            .collect();
                        for number in enabled {
                            state.emit(number, raw_sample(handle.profile, number, t));
                        }
                    },
                }
            }
        });

        cancel
    }
}

impl MeasurementDevice for SimDevice {
    fn sensors(&self) -> Vec<SensorChannel> {
        self.handle.sensors()
    }

    fn set_enabled(&mut self, number: u8, enabled: bool) {
        let mut state = self.handle.lock();
        if let Some(sensor) = state.sensors.iter_mut().find(|sensor| sensor.number == number) {
            sensor.enabled = enabled;
        }
    }

    fn measurements_started(&mut self) -> BoxStream<'static, ()> {
        let (sender, receiver) = unbounded();
        self.handle.lock().started_listeners.push(sender);
        receiver.boxed()
    }

    fn value_changed(&mut self, number: u8) -> BoxStream<'static, f64> {
        let (sender, receiver) = unbounded();
        let mut state = self.handle.lock();
        state.value_listeners.push((number, sender));
        state.subscriptions.push(number);
        receiver.boxed()
    }

    fn start(&mut self, period_ms: u64) {
        let waveform_cancel = self.waveform.as_ref().map(|runtime| self.spawn_waveform(runtime, period_ms));

        let mut state = self.handle.lock();
        state.stop();
        state.waveform_cancel = waveform_cancel;
        state.start(self.handle.default_sensor, period_ms);
    }

    fn stop(&mut self) {
        let mut state = self.handle.lock();
        state.stops += 1;
        state.stop();
    }
}

impl Drop for SimDevice {
    fn drop(&mut self) {
        let mut state = self.handle.lock();
        state.stop();
        state.alive = false;
        // dropping the senders ends every stream handed out by this device
        state.started_listeners.clear();
        state.value_listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::constants::*;
    use crate::device::profiles::{GDXMD, GDXTMP};

    #[test]
    fn started_device_enables_its_default_sensor() {
        let mut device = SimDevice::new(&GDXTMP, None, DeviceOptions::default());
        let mut started = device.measurements_started();
        assert!(device.sensors().iter().all(|sensor| !sensor.enabled));

        device.start(GDXTMP_MEASUREMENT_PERIOD);
        assert!(device.sensors().iter().all(|sensor| sensor.enabled));
        assert_eq!(futures::executor::block_on(started.next()), Some(()));
    }

    #[test]
    fn explicit_enablement_is_kept_at_start() {
        let mut device = SimDevice::new(&GDXMD, None, DeviceOptions::default());
        device.set_enabled(GDXMD_POSITION_CART, true);
        device.start(GDXMD_MEASUREMENT_PERIOD);

        let enabled: Vec<u8> = device.sensors().iter().filter(|s| s.enabled).map(|s| s.number).collect();
        assert_eq!(enabled, vec![GDXMD_POSITION_CART]);
    }

    #[test]
    fn values_reach_only_listeners_of_that_channel() {
        let mut device = SimDevice::new(&GDXMD, None, DeviceOptions::default());
        let mut cart = device.value_changed(GDXMD_POSITION_CART);
        let handle = device.handle();

        handle.emit(GDXMD_POSITION, 1.5);
        handle.emit(GDXMD_POSITION_CART, 0.7);
        assert_eq!(futures::executor::block_on(cart.next()), Some(0.7));

        drop(device);
        assert!(!handle.is_alive());
        assert_eq!(futures::executor::block_on(cart.next()), None);
    }

    #[tokio::test]
    async fn waveform_device_reports_values() {
        let mut device = SimDevice::new(&GDXTMP, Some(Handle::current()), DeviceOptions::default());
        let mut values = device.value_changed(GDXTMP_TEMPERATURE);
        device.start(10);

        let value = tokio::time::timeout(Duration::from_secs(1), values.next()).await.unwrap().unwrap();
        assert!((22.0..=34.0).contains(&value));
        device.stop();
        assert_eq!(device.handle().stop_count(), 1);
        assert_eq!(device.handle().period_ms(), None);
    }
}
