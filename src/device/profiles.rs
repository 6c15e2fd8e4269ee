use crate::device::constants::*;
use crate::device::types::{ChannelSpec, Enablement, MeasurementConfig, PeripheralIdentity, PeripheralProfile};

fn scaled(raw: f64) -> f64 {
    raw * DISPLAY_SCALE
}

fn unscaled(raw: f64) -> f64 {
    raw
}

const fn godirect_identity(name_prefix: &'static str) -> PeripheralIdentity {
    PeripheralIdentity {
        name_prefix,
        service_id: GODIRECT_SERVICE_UUID,
        command_channel_id: GODIRECT_COMMAND_UUID,
        response_channel_id: GODIRECT_RESPONSE_UUID,
    }
}

const fn channel(number: u8, semantic_name: &'static str, enabled_by_default: bool, raw_to_semantic: fn(f64) -> f64) -> ChannelSpec {
    ChannelSpec { number, semantic_name, enabled_by_default, raw_to_semantic }
}

pub const MAG_FIELD_X: &str = "magFieldX";
pub const MAG_FIELD_Y: &str = "magFieldY";
pub const MAG_FIELD_Z: &str = "magFieldZ";
pub const MAG_FIELD_HIGH_X: &str = "magFieldHighX";
pub const MAG_FIELD_HIGH_Y: &str = "magFieldHighY";
pub const MAG_FIELD_HIGH_Z: &str = "magFieldHighZ";

pub const POSITION: &str = "position";
pub const POSITION_CART: &str = "positionCart";
pub const POSITION_TC: &str = "positionTc";

pub const TEMPERATURE: &str = "temperature";

/// GDX-3MG: three standard and three high range axes, all enabled.
pub static GDX3MG: PeripheralProfile = PeripheralProfile {
    extension_id: "gdx3mg",
    name: "Magnetic Field",
    identity: godirect_identity("GDX-3MG"),
    channels: &[
        channel(GDX3MG_MAGNETIC_FIELD_X, MAG_FIELD_X, true, scaled),
        channel(GDX3MG_MAGNETIC_FIELD_Y, MAG_FIELD_Y, true, scaled),
        channel(GDX3MG_MAGNETIC_FIELD_Z, MAG_FIELD_Z, true, scaled),
        channel(GDX3MG_MAGNETIC_FIELD_HIGH_X, MAG_FIELD_HIGH_X, true, scaled),
        channel(GDX3MG_MAGNETIC_FIELD_HIGH_Y, MAG_FIELD_HIGH_Y, true, scaled),
        channel(GDX3MG_MAGNETIC_FIELD_HIGH_Z, MAG_FIELD_HIGH_Z, true, scaled),
    ],
    measurement: MeasurementConfig {
        sample_period_ms: GDX3MG_MEASUREMENT_PERIOD,
        enablement: Enablement::All,
    },
};

/// GDX-MD: three resolutions of the same distance, only the high resolution (cart) one is enabled.
pub static GDXMD: PeripheralProfile = PeripheralProfile {
    extension_id: "gdxmd",
    name: "Motion Detector",
    identity: godirect_identity("GDX-MD"),
    channels: &[
        channel(GDXMD_POSITION, POSITION, false, scaled),
        channel(GDXMD_POSITION_CART, POSITION_CART, true, scaled),
        channel(GDXMD_POSITION_TC, POSITION_TC, false, scaled),
    ],
    measurement: MeasurementConfig {
        sample_period_ms: GDXMD_MEASUREMENT_PERIOD,
        enablement: Enablement::Declared,
    },
};

/// GDX-TMP: nothing is enabled explicitly, the probe streams its default channel.
pub static GDXTMP: PeripheralProfile = PeripheralProfile {
    extension_id: "gdxtmp",
    name: "Temperature",
    identity: godirect_identity("GDX-TMP"),
    channels: &[
        channel(GDXTMP_TEMPERATURE, TEMPERATURE, false, unscaled),
    ],
    measurement: MeasurementConfig {
        sample_period_ms: GDXTMP_MEASUREMENT_PERIOD,
        enablement: Enablement::None,
    },
};

pub static PROFILES: [&PeripheralProfile; 3] = [&GDX3MG, &GDXMD, &GDXTMP];

pub fn find_profile(extension_id: &str) -> Option<&'static PeripheralProfile> {
    PROFILES.iter().copied().find(|profile| profile.extension_id == extension_id)
}
