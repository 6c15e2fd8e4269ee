use indexmap::IndexMap;
use log::warn;

use crate::blocks::gdx3mg::Gdx3mgBlocks;
use crate::blocks::gdxmd::GdxMdBlocks;
use crate::blocks::gdxtmp::GdxTmpBlocks;
use crate::blocks::{BlockArgs, BlockValue, Extension, ExtensionInfo};
use crate::device::driver::DriverContext;

/// Every extension of the bridge, keyed by extension id, in registration order.
pub struct ExtensionRegistry {
    extensions: IndexMap<&'static str, Box<dyn Extension>>,
}

impl ExtensionRegistry {
    pub fn new(context: DriverContext) -> Self {
        let mut registry = ExtensionRegistry { extensions: IndexMap::new() };
        registry.register(Box::new(Gdx3mgBlocks::new(context.clone())));
        registry.register(Box::new(GdxMdBlocks::new(context.clone())));
        registry.register(Box::new(GdxTmpBlocks::new(context)));
        registry
    }

    fn register(&mut self, extension: Box<dyn Extension>) {
        self.extensions.insert(extension.extension_id(), extension);
    }

    pub fn get(&self, extension_id: &str) -> Option<&dyn Extension> {
        self.extensions.get(extension_id).map(|extension| extension.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Extension> {
        self.extensions.values().map(|extension| extension.as_ref())
    }

    pub fn info(&self) -> Vec<ExtensionInfo> {
        self.iter().map(|extension| extension.info()).collect()
    }

    /// Runs `opcode` of `extension_id`. Unknown extensions and opcodes are logged and yield `None`.
    pub fn call(&self, extension_id: &str, opcode: &str, args: &BlockArgs) -> Option<BlockValue> {
        let Some(extension) = self.get(extension_id) else {
            warn!("Unknown extension {}", extension_id);
            return None;
        };

        let value = extension.call(opcode, args);
        if value.is_none() {
            warn!("{}: unknown opcode {}", extension_id, opcode);
        }
        value
    }
}
