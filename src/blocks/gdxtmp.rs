use indexmap::IndexMap;

use crate::blocks::{round_half_up, BlockArgs, BlockInfo, BlockValue, Extension, ExtensionInfo};
use crate::device::constants::GDXTMP_TEMPERATURE;
use crate::device::driver::{DriverContext, PeripheralDriver};
use crate::device::profiles::GDXTMP;

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 1.8 + 32.0
}

/// Blocks of the GDX-TMP temperature probe. The cache holds Celsius, Fahrenheit is derived on read.
pub struct GdxTmpBlocks {
    driver: PeripheralDriver,
}

impl GdxTmpBlocks {
    pub const EXTENSION_ID: &'static str = "gdxtmp";

    pub fn new(context: DriverContext) -> Self {
        GdxTmpBlocks { driver: PeripheralDriver::new(&GDXTMP, context) }
    }

    pub fn get_temperature(&self) -> i64 {
        round_half_up(self.driver.value(GDXTMP_TEMPERATURE))
    }

    pub fn get_temperature_f(&self) -> i64 {
        round_half_up(celsius_to_fahrenheit(self.driver.value(GDXTMP_TEMPERATURE)))
    }
}

impl Extension for GdxTmpBlocks {
    fn driver(&self) -> &PeripheralDriver {
        &self.driver
    }

    fn info(&self) -> ExtensionInfo {
        ExtensionInfo {
            id: Self::EXTENSION_ID,
            name: GDXTMP.name,
            show_status_button: true,
            blocks: vec![
                BlockInfo::reporter("getTemperature", "temperature (°C)"),
                BlockInfo::reporter("getTemperatureF", "temperature (°F)"),
            ],
            menus: IndexMap::new(),
        }
    }

    fn call(&self, opcode: &str, _args: &BlockArgs) -> Option<BlockValue> {
        match opcode {
            "getTemperature" => Some(BlockValue::Integer(self.get_temperature())),
            "getTemperatureF" => Some(BlockValue::Integer(self.get_temperature_f())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::testing::sim_context;

    #[tokio::test]
    async fn fahrenheit_is_derived_from_the_cached_celsius() {
        let blocks = GdxTmpBlocks::new(sim_context());
        for (celsius, fahrenheit) in [(-40.0, -40), (0.0, 32), (37.0, 99), (100.0, 212)] {
            blocks.driver().cache().store(GDXTMP_TEMPERATURE, celsius);
            assert_eq!(blocks.get_temperature_f(), fahrenheit, "{} °C", celsius);
            assert_eq!(blocks.get_temperature_f(), round_half_up(celsius * 1.8 + 32.0));
        }
    }

    #[tokio::test]
    async fn celsius_is_rounded() {
        let blocks = GdxTmpBlocks::new(sim_context());
        assert_eq!(blocks.get_temperature(), 0);
        assert_eq!(blocks.get_temperature_f(), 32);

        blocks.driver().cache().store(GDXTMP_TEMPERATURE, 21.5);
        assert_eq!(blocks.call("getTemperature", &BlockArgs::new()), Some(BlockValue::Integer(22)));
        assert_eq!(blocks.call("getTemperatureF", &BlockArgs::new()), Some(BlockValue::Integer(71)));
    }
}
