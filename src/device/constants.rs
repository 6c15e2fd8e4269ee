use uuid::Uuid;

/**
 * How often (milliseconds) the BLE transport re-reads the list of discovered peripherals while scanning.
 */
pub const SCAN_POLL_DELAY: u64 = 250;

/**
 * How often (milliseconds) to check the connection status of a connected peripheral.
 */
pub const CONNECTION_POLL_DELAY: u64 = 1000;

/**
 * How long (milliseconds) a write to a characteristic may take.
 */
pub const WRITE_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) checking if the peripheral is still connected may take
 */
pub const IS_CONNECTED_DEADLINE: u64 = 2000;

/**
 * The UUID of the Bluetooth BLE service for Vernier GoDirect sensors
 */
pub const GODIRECT_SERVICE: &str = "d91714ef-28b9-4f91-ba16-f0d9a604f112";

/**
 * The UUID of the GATT characteristic that GoDirect commands are written to.
 */
pub const GODIRECT_COMMAND_CHARACTERISTIC: &str = "f4bf14a6-c7d5-4b6d-8aa8-df1a7c83adcb";

/**
 * The UUID of the GATT characteristic that GoDirect responses and measurements are notified on.
 */
pub const GODIRECT_RESPONSE_CHARACTERISTIC: &str = "b41e6675-a329-40e0-aa01-44d2f444babe";

pub const GODIRECT_SERVICE_UUID: Uuid = Uuid::from_u128(0xd91714ef_28b9_4f91_ba16_f0d9a604f112);
pub const GODIRECT_COMMAND_UUID: Uuid = Uuid::from_u128(0xf4bf14a6_c7d5_4b6d_8aa8_df1a7c83adcb);
pub const GODIRECT_RESPONSE_UUID: Uuid = Uuid::from_u128(0xb41e6675_a329_40e0_aa01_44d2f444babe);

/**
 * Sensor numbers of the GDX-3MG magnetic field sensor.
 * The standard channels cover roughly +/- 5 mT, the high channels roughly +/- 130 mT.
 */
pub const GDX3MG_MAGNETIC_FIELD_X: u8 = 1;
pub const GDX3MG_MAGNETIC_FIELD_Y: u8 = 2;
pub const GDX3MG_MAGNETIC_FIELD_Z: u8 = 3;
pub const GDX3MG_MAGNETIC_FIELD_HIGH_X: u8 = 4;
pub const GDX3MG_MAGNETIC_FIELD_HIGH_Y: u8 = 5;
pub const GDX3MG_MAGNETIC_FIELD_HIGH_Z: u8 = 6;

/**
 * Sensor numbers of the GDX-MD motion detector.
 */
pub const GDXMD_POSITION: u8 = 5; // Standard resolution (~.25 m to ~3.5 m)
pub const GDXMD_POSITION_CART: u8 = 6; // High resolution (~.15 m to 2 m)
pub const GDXMD_POSITION_TC: u8 = 7; // Temperature compensated

/**
 * Sensor numbers of the GDX-TMP temperature probe. The native unit is Celsius.
 */
pub const GDXTMP_TEMPERATURE: u8 = 1;

/**
 * Measurement periods (milliseconds) used to sample all enabled channels.
 */
pub const GDX3MG_MEASUREMENT_PERIOD: u64 = 100;
pub const GDXMD_MEASUREMENT_PERIOD: u64 = 250;
pub const GDXTMP_MEASUREMENT_PERIOD: u64 = 250;

/**
 * Raw readings are multiplied by this factor to amplify small magnitudes into a display-friendly range.
 */
pub const DISPLAY_SCALE: f64 = 100.0;
