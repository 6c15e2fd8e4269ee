use std::sync::atomic::{AtomicU64, Ordering};

use crate::device::types::PeripheralProfile;

/// Most recent semantic value of every declared channel of one peripheral type.
///
/// Each entry is an `f64` stored as its bit pattern in an `AtomicU64`, so a reader polling from the
/// host never blocks on (or observes half of) a write coming from the measurement stream.
#[derive(Debug)]
pub struct SensorCache {
    profile: &'static PeripheralProfile,
    values: Box<[AtomicU64]>,
}

const ZERO_BITS: u64 = 0; // 0.0_f64.to_bits()

impl SensorCache {
    pub fn new(profile: &'static PeripheralProfile) -> Self {
        let values = profile.channels.iter().map(|_| AtomicU64::new(ZERO_BITS)).collect();
        SensorCache { profile, values }
    }

    pub fn profile(&self) -> &'static PeripheralProfile {
        self.profile
    }

    /// Value of the declared channel `number`; unknown channels read as 0.
    pub fn get(&self, number: u8) -> f64 {
        match self.profile.channel_index(number) {
            Some(index) => f64::from_bits(self.values[index].load(Ordering::Acquire)),
            None => 0.0,
        }
    }

    pub fn get_by_name(&self, semantic_name: &str) -> f64 {
        match self.profile.channel_by_name(semantic_name) {
            Some(spec) => self.get(spec.number),
            None => 0.0,
        }
    }

    /// Stores an already translated value. Returns false if `number` is not a declared channel.
    pub fn store(&self, number: u8, value: f64) -> bool {
        match self.profile.channel_index(number) {
            Some(index) => {
                self.values[index].store(value.to_bits(), Ordering::Release);
                true
            },
            None => false,
        }
    }

    pub fn reset(&self) {
        for value in self.values.iter() {
            value.store(ZERO_BITS, Ordering::Release);
        }
    }

    /// (semantic name, value) of every declared channel, in profile order.
    pub fn snapshot(&self) -> Vec<(&'static str, f64)> {
        self.profile.channels.iter()
            .zip(self.values.iter())
            .map(|(spec, value)| (spec.semantic_name, f64::from_bits(value.load(Ordering::Acquire))))
            .collect()
    }
}
