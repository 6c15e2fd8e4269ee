use indexmap::IndexMap;

use crate::blocks::{round_half_up, BlockArgs, BlockInfo, BlockValue, Extension, ExtensionInfo};
use crate::device::constants::*;
use crate::device::driver::{DriverContext, PeripheralDriver};
use crate::device::profiles::GDX3MG;

pub fn magnitude(x: f64, y: f64, z: f64) -> f64 {
    ((x * x) + (y * y) + (z * z)).sqrt()
}

/// Blocks of the GDX-3MG magnetic field sensor.
pub struct Gdx3mgBlocks {
    driver: PeripheralDriver,
}

impl Gdx3mgBlocks {
    pub const EXTENSION_ID: &'static str = "gdx3mg";

    pub fn new(context: DriverContext) -> Self {
        Gdx3mgBlocks { driver: PeripheralDriver::new(&GDX3MG, context) }
    }

    fn axes(&self, x: u8, y: u8, z: u8) -> f64 {
        magnitude(self.driver.value(x), self.driver.value(y), self.driver.value(z))
    }

    pub fn get_mag_field_magnitude(&self) -> f64 {
        self.axes(GDX3MG_MAGNETIC_FIELD_X, GDX3MG_MAGNETIC_FIELD_Y, GDX3MG_MAGNETIC_FIELD_Z)
    }

    pub fn get_mag_field_x(&self) -> i64 {
        round_half_up(self.driver.value(GDX3MG_MAGNETIC_FIELD_X))
    }

    pub fn get_mag_field_y(&self) -> i64 {
        round_half_up(self.driver.value(GDX3MG_MAGNETIC_FIELD_Y))
    }

    pub fn get_mag_field_z(&self) -> i64 {
        round_half_up(self.driver.value(GDX3MG_MAGNETIC_FIELD_Z))
    }

    pub fn get_mag_field_high_magnitude(&self) -> f64 {
        self.axes(GDX3MG_MAGNETIC_FIELD_HIGH_X, GDX3MG_MAGNETIC_FIELD_HIGH_Y, GDX3MG_MAGNETIC_FIELD_HIGH_Z)
    }

    pub fn get_mag_field_high_x(&self) -> i64 {
        round_half_up(self.driver.value(GDX3MG_MAGNETIC_FIELD_HIGH_X))
    }

    pub fn get_mag_field_high_y(&self) -> i64 {
        round_half_up(self.driver.value(GDX3MG_MAGNETIC_FIELD_HIGH_Y))
    }

    pub fn get_mag_field_high_z(&self) -> i64 {
        round_half_up(self.driver.value(GDX3MG_MAGNETIC_FIELD_HIGH_Z))
    }
}

impl Extension for Gdx3mgBlocks {
    fn driver(&self) -> &PeripheralDriver {
        &self.driver
    }

    fn info(&self) -> ExtensionInfo {
        ExtensionInfo {
            id: Self::EXTENSION_ID,
            name: GDX3MG.name,
            show_status_button: true,
            blocks: vec![
                BlockInfo::reporter("getMagFieldMagnitude", "total magnetic field"),
                BlockInfo::reporter("getMagFieldX", "x-axis"),
                BlockInfo::reporter("getMagFieldY", "y-axis"),
                BlockInfo::reporter("getMagFieldZ", "z-axis"),
                BlockInfo::reporter("getMagFieldHighMagnitude", "total magnetic field (high)"),
                BlockInfo::reporter("getMagFieldHighX", "x-axis (high)"),
                BlockInfo::reporter("getMagFieldHighY", "y-axis (high)"),
                BlockInfo::reporter("getMagFieldHighZ", "z-axis (high)"),
            ],
            menus: IndexMap::new(),
        }
    }

    fn call(&self, opcode: &str, _args: &BlockArgs) -> Option<BlockValue> {
        let value = match opcode {
            "getMagFieldMagnitude" => BlockValue::Float(self.get_mag_field_magnitude()),
            "getMagFieldX" => BlockValue::Integer(self.get_mag_field_x()),
            "getMagFieldY" => BlockValue::Integer(self.get_mag_field_y()),
            "getMagFieldZ" => BlockValue::Integer(self.get_mag_field_z()),
            "getMagFieldHighMagnitude" => BlockValue::Float(self.get_mag_field_high_magnitude()),
            "getMagFieldHighX" => BlockValue::Integer(self.get_mag_field_high_x()),
            "getMagFieldHighY" => BlockValue::Integer(self.get_mag_field_high_y()),
            "getMagFieldHighZ" => BlockValue::Integer(self.get_mag_field_high_z()),
            _ => return None,
        };
        Some(value)
    }
}
