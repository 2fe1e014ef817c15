//! Named stage factories.
//!
//! `build.plugins` refers to stages by name; the registry turns each entry
//! into a stage instance. Built-in stages are pre-registered and embedders can
//! add their own opaque implementations.

use std::sync::Arc;

use indexmap::IndexMap;
use kiln_config::PluginOptions;
use serde_json::Value;

use super::builtin::{ComponentStage, DefineStage, FrameworkStage, JsxStage};
use super::{PluginStage, StageError};
use crate::{Error, Result};

/// Creates a stage from its `config` value.
pub type StageFactory =
    Arc<dyn Fn(&Value) -> std::result::Result<Arc<dyn PluginStage>, StageError> + Send + Sync>;

/// Registry of stage factories, keyed by stage name
#[derive(Clone)]
pub struct StageRegistry {
    factories: IndexMap<String, StageFactory>,
}

impl StageRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// Registry with the built-in `framework`, `component`, `jsx` and `define` stages
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(FrameworkStage::NAME, |config| {
            Ok(Arc::new(FrameworkStage::from_config(config)?) as Arc<dyn PluginStage>)
        });
        registry.register(ComponentStage::NAME, |_| {
            Ok(Arc::new(ComponentStage) as Arc<dyn PluginStage>)
        });
        registry.register(JsxStage::NAME, |config| {
            Ok(Arc::new(JsxStage::from_config(config)?) as Arc<dyn PluginStage>)
        });
        registry.register(DefineStage::NAME, |_| {
            Ok(Arc::new(DefineStage) as Arc<dyn PluginStage>)
        });
        registry
    }

    /// Register (or replace) a factory under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> std::result::Result<Arc<dyn PluginStage>, StageError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Register an already-built stage under its own name
    pub fn register_instance(&mut self, stage: Arc<dyn PluginStage>) {
        let name = stage.name().to_string();
        self.register(name, move |_| Ok(stage.clone()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate the enabled entries of `build.plugins`, preserving order
    pub fn instantiate(&self, plugins: &[PluginOptions]) -> Result<Vec<Arc<dyn PluginStage>>> {
        plugins
            .iter()
            .filter(|plugin| plugin.enabled)
            .map(|plugin| self.create(plugin))
            .collect()
    }

    fn create(&self, plugin: &PluginOptions) -> Result<Arc<dyn PluginStage>> {
        let factory = self.factories.get(&plugin.name).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "unknown plugin stage `{}` (registered: {})",
                plugin.name,
                self.factories.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;

        factory(&plugin.config).map_err(|err| {
            Error::InvalidConfig(format!("plugin stage `{}`: {}", plugin.name, err))
        })
    }

    /// Get the number of registered factories
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
