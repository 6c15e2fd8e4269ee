use indexmap::IndexMap;

use crate::blocks::threshold::{closer_than, farther_than, DistanceBucket};
use crate::blocks::{round_half_up, ArgumentInfo, ArgumentType, BlockArgs, BlockInfo, BlockValue, Extension, ExtensionInfo, MenuItem};
use crate::device::constants::GDXMD_POSITION_CART;
use crate::device::driver::{DriverContext, PeripheralDriver};
use crate::device::profiles::GDXMD;

const DISTANCE_ARGUMENT: &str = "DISTANCE";
const DISTANCE_MENU: &str = "distanceOptions";

/// Blocks of the GDX-MD motion detector. Only the high resolution (cart) distance is exposed.
pub struct GdxMdBlocks {
    driver: PeripheralDriver,
}

impl GdxMdBlocks {
    pub const EXTENSION_ID: &'static str = "gdxmd";

    pub fn new(context: DriverContext) -> Self {
        GdxMdBlocks { driver: PeripheralDriver::new(&GDXMD, context) }
    }

    pub fn get_distance_cart(&self) -> i64 {
        round_half_up(self.driver.value(GDXMD_POSITION_CART))
    }

    pub fn when_closer_than(&self, distance: &str) -> bool {
        closer_than(self.get_distance_cart(), distance)
    }

    pub fn when_farther_than(&self, distance: &str) -> bool {
        farther_than(self.get_distance_cart(), distance)
    }

    fn distance_arguments() -> IndexMap<&'static str, ArgumentInfo> {
        IndexMap::from([(DISTANCE_ARGUMENT, ArgumentInfo {
            argument_type: ArgumentType::String,
            menu: DISTANCE_MENU,
            default_value: DistanceBucket::Notebook.value(),
        })])
    }
}

impl Extension for GdxMdBlocks {
    fn driver(&self) -> &PeripheralDriver {
        &self.driver
    }

    fn info(&self) -> ExtensionInfo {
        let distance_menu = DistanceBucket::ALL.iter()
            .map(|bucket| MenuItem { text: bucket.value(), value: bucket.value() })
            .collect();

        ExtensionInfo {
            id: Self::EXTENSION_ID,
            name: GDXMD.name,
            show_status_button: true,
            blocks: vec![
                BlockInfo::reporter("getDistanceCart", "distance"),
                BlockInfo::hat("whenCloserThan", "when closer than a [DISTANCE]", Self::distance_arguments()),
                BlockInfo::hat("whenFartherThan", "when farther than a [DISTANCE]", Self::distance_arguments()),
            ],
            menus: IndexMap::from([(DISTANCE_MENU, distance_menu)]),
        }
    }

    fn call(&self, opcode: &str, args: &BlockArgs) -> Option<BlockValue> {
        let distance = args.get(DISTANCE_ARGUMENT).map(String::as_str).unwrap_or_default();

        let value = match opcode {
            "getDistanceCart" => BlockValue::Integer(self.get_distance_cart()),
            "whenCloserThan" => BlockValue::Boolean(self.when_closer_than(distance)),
            "whenFartherThan" => BlockValue::Boolean(self.when_farther_than(distance)),
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::testing::sim_context;
    use crate::device::constants::{GDXMD_POSITION, GDXMD_POSITION_TC};

    fn args(distance: &str) -> BlockArgs {
        BlockArgs::from([(DISTANCE_ARGUMENT.to_string(), distance.to_string())])
    }

    #[tokio::test]
    async fn distance_thresholds() {
        let blocks = GdxMdBlocks::new(sim_context());
        blocks.driver().cache().store(GDXMD_POSITION_CART, 37.6);
        assert_eq!(blocks.get_distance_cart(), 38);

        assert!(blocks.when_closer_than("notebook"));
        assert!(blocks.when_farther_than("notebook"));
        assert!(!blocks.when_closer_than("pencil"));
        assert!(blocks.when_farther_than("pencil"));
        assert!(blocks.when_closer_than("desk"));
        assert!(!blocks.when_farther_than("desk"));

        assert!(!blocks.when_closer_than("bookshelf"));
        assert!(!blocks.when_farther_than("bookshelf"));
    }

    #[tokio::test]
    async fn only_the_cart_channel_is_reported() {
        let blocks = GdxMdBlocks::new(sim_context());
        blocks.driver().cache().store(GDXMD_POSITION, 150.0);
        blocks.driver().cache().store(GDXMD_POSITION_TC, 150.0);
        assert_eq!(blocks.get_distance_cart(), 0);
    }

    #[tokio::test]
    async fn dispatch_by_opcode() {
        let blocks = GdxMdBlocks::new(sim_context());
        blocks.driver().cache().store(GDXMD_POSITION_CART, 120.2);

        assert_eq!(blocks.call("getDistanceCart", &BlockArgs::new()), Some(BlockValue::Integer(120)));
        assert_eq!(blocks.call("whenFartherThan", &args("desk")), Some(BlockValue::Boolean(true)));
        assert_eq!(blocks.call("whenCloserThan", &args("desk")), Some(BlockValue::Boolean(false)));
        // a missing argument is an unknown bucket
        assert_eq!(blocks.call("whenFartherThan", &BlockArgs::new()), Some(BlockValue::Boolean(false)));
        assert_eq!(blocks.call("getDistance", &BlockArgs::new()), None);
    }

    #[tokio::test]
    async fn info_describes_the_distance_menu() {
        let blocks = GdxMdBlocks::new(sim_context());
        let info = blocks.info();
        assert_eq!(info.default_args("whenCloserThan"), args("notebook"));
        assert!(info.default_args("getDistanceCart").is_empty());

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["blocks"][1]["blockType"], "hat");
        assert_eq!(json["blocks"][1]["arguments"]["DISTANCE"]["type"], "string");
        assert_eq!(json["blocks"][1]["arguments"]["DISTANCE"]["defaultValue"], "notebook");
        let menu: Vec<&str> = json["menus"]["distanceOptions"].as_array().unwrap()
            .iter()
            .map(|item| item["value"].as_str().unwrap())
            .collect();
        assert_eq!(menu, vec!["pencil", "notebook", "desk"]);
    }
}
