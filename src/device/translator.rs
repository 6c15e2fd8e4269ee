use log::warn;

use crate::device::cache::SensorCache;
use crate::device::types::PeripheralProfile;

/// Converts a raw channel reading into the semantic value cached for it, if the channel is declared.
pub fn translate(profile: &PeripheralProfile, number: u8, raw: f64) -> Option<f64> {
    profile.channel(number).map(|spec| (spec.raw_to_semantic)(raw))
}

/// Handles one value-changed event: translates `raw` and updates exactly one cache entry.
/// Events for undeclared channels leave the cache untouched.
pub fn apply_value(cache: &SensorCache, number: u8, raw: f64) -> bool {
    let profile = cache.profile();

    match translate(profile, number, raw) {
        Some(value) => cache.store(number, value),
        None => {
            warn!("{}: ignoring value {} for unknown channel {}", profile.extension_id, raw, number);
            false
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::constants::*;
    use crate::device::profiles::{GDX3MG, GDXMD, GDXTMP};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn magnetometer_scales_every_axis() {
        for number in 1..=6 {
            let value = translate(&GDX3MG, number, 0.02).unwrap();
            assert!(approx(value, 2.0), "channel {} -> {}", number, value);
        }
        // no clamping
        assert!(approx(translate(&GDX3MG, GDX3MG_MAGNETIC_FIELD_HIGH_Z, -130.0).unwrap(), -13000.0));
    }

    #[test]
    fn motion_detector_scales_every_resolution() {
        for number in [GDXMD_POSITION, GDXMD_POSITION_CART, GDXMD_POSITION_TC] {
            assert!(approx(translate(&GDXMD, number, 0.38).unwrap(), 38.0));
        }
    }

    #[test]
    fn temperature_is_passed_through() {
        assert_eq!(translate(&GDXTMP, GDXTMP_TEMPERATURE, 21.7), Some(21.7));
    }

    #[test]
    fn unknown_channel_is_ignored() {
        let cache = SensorCache::new(&GDXMD);
        assert_eq!(translate(&GDXMD, 1, 5.0), None);
        assert!(!apply_value(&cache, 1, 5.0));
        assert!(cache.snapshot().iter().all(|(_, value)| *value == 0.0));
    }

    #[test]
    fn apply_value_updates_exactly_one_entry() {
        let cache = SensorCache::new(&GDX3MG);
        assert!(apply_value(&cache, GDX3MG_MAGNETIC_FIELD_Y, 0.5));
        let snapshot = cache.snapshot();
        let changed: Vec<_> = snapshot.iter().filter(|(_, value)| *value != 0.0).collect();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].0, "magFieldY");
        assert!(approx(changed[0].1, 50.0));
    }
}
