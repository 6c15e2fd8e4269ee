use std::f64::consts::TAU;

use crate::device::constants::*;
use crate::device::types::PeripheralProfile;

/// Raw reading (device native unit) the simulator reports for channel `number` at `t` seconds.
pub fn raw_sample(profile: &PeripheralProfile, number: u8, t: f64) -> f64 {
    // spread the axes apart so that magnitudes change over time
    let phase = f64::from(number) * TAU / 3.0;

    match (profile.extension_id, number) {
        ("gdx3mg", GDX3MG_MAGNETIC_FIELD_X..=GDX3MG_MAGNETIC_FIELD_Z) => 0.04 * (0.5 * t + phase).sin(),
        ("gdx3mg", GDX3MG_MAGNETIC_FIELD_HIGH_X..=GDX3MG_MAGNETIC_FIELD_HIGH_Z) => 0.9 * (0.5 * t + phase).sin(),
        // a hand moving between ~25 cm and ~1.5 m in front of the detector
        ("gdxmd", _) => 0.85 + 0.6 * (0.4 * t).sin(),
        // a probe slowly warmed up in a hand
        ("gdxtmp", GDXTMP_TEMPERATURE) => 22.0 + 12.0 * (1.0 - (-t / 30.0).exp()),
        _ => 0.0,
    }
}
