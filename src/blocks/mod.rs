use std::fmt;
use indexmap::IndexMap;
use serde::Serialize;

use crate::device::driver::PeripheralDriver;

pub mod gdx3mg;
pub mod gdxmd;
pub mod gdxtmp;
pub mod registry;
pub mod threshold;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Reporter,
    Boolean,
    Hat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentInfo {
    #[serde(rename = "type")]
    pub argument_type: ArgumentType,
    pub menu: &'static str,
    pub default_value: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    pub opcode: &'static str,
    pub text: &'static str,
    pub block_type: BlockType,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub arguments: IndexMap<&'static str, ArgumentInfo>,
}

impl BlockInfo {
    pub fn reporter(opcode: &'static str, text: &'static str) -> Self {
        BlockInfo { opcode, text, block_type: BlockType::Reporter, arguments: IndexMap::new() }
    }

    pub fn hat(opcode: &'static str, text: &'static str, arguments: IndexMap<&'static str, ArgumentInfo>) -> Self {
        BlockInfo { opcode, text, block_type: BlockType::Hat, arguments }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub text: &'static str,
    pub value: &'static str,
}

/// Block metadata of one extension, in the shape the host expects from `getInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub show_status_button: bool,
    pub blocks: Vec<BlockInfo>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub menus: IndexMap<&'static str, Vec<MenuItem>>,
}

impl ExtensionInfo {
    /// Arguments filled with their default values, for polling `opcode` without user input.
    pub fn default_args(&self, opcode: &str) -> BlockArgs {
        self.blocks.iter()
            .find(|block| block.opcode == opcode)
            .map(|block| {
                block.arguments.iter()
                    .map(|(name, argument)| (name.to_string(), argument.default_value.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub type BlockArgs = IndexMap<String, String>;

/// What a reporter or predicate hands back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BlockValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl fmt::Display for BlockValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockValue::Integer(value) => write!(f, "{}", value),
            BlockValue::Float(value) => write!(f, "{:.2}", value),
            BlockValue::Boolean(value) => write!(f, "{}", value),
        }
    }
}

/// Rounds like the host runtime does: halves go towards positive infinity.
pub fn round_half_up(value: f64) -> i64 {
    // value - floor(value) is exact, value + 0.5 is not
    let floor = value.floor();
    if value - floor >= 0.5 {
        floor as i64 + 1
    } else {
        floor as i64
    }
}

/// A peripheral extension as seen by the host: connection control plus reporters and predicates
/// which read the driver's cache and never block.
pub trait Extension: Send + Sync {
    fn driver(&self) -> &PeripheralDriver;

    fn info(&self) -> ExtensionInfo;

    /// Runs the block `opcode`; `None` if this extension has no such block.
    fn call(&self, opcode: &str, args: &BlockArgs) -> Option<BlockValue>;

    fn extension_id(&self) -> &'static str {
        self.driver().profile().extension_id
    }

    fn scan(&self) {
        self.driver().scan();
    }

    fn connect(&self, id: &str) {
        self.driver().connect(id);
    }

    fn disconnect(&self) {
        self.driver().disconnect();
    }

    fn is_connected(&self) -> bool {
        self.driver().is_connected()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_like_the_host() {
        assert_eq!(round_half_up(2.4), 2);
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(-2.5), -2);
        assert_eq!(round_half_up(-2.6), -3);
        assert_eq!(round_half_up(0.0), 0);
        assert_eq!(round_half_up(0.49999999999999994), 0);
        assert_eq!(round_half_up(-0.5), 0);
        assert_eq!(round_half_up(4503599627370497.0), 4503599627370497);
    }

    #[test]
    fn block_values_serialize_as_plain_json() {
        let values = vec![BlockValue::Integer(3), BlockValue::Float(1.5), BlockValue::Boolean(true)];
        assert_eq!(serde_json::to_string(&values).unwrap(), "[3,1.5,true]");
    }
}
