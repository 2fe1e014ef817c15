use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::build::helpers::default_true;

/// A plugin stage requested by name. Stages run in the order they are listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginOptions {
    /// Registered stage name (`framework`, `component`, `jsx`, `define`)
    pub name: String,

    /// Whether the stage should be loaded
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Stage-specific configuration forwarded when the stage is created
    #[serde(default)]
    pub config: Value,

    /// Profile-specific overrides merged over this entry
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub profiles: HashMap<String, Value>,
}

impl PluginOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            config: Value::Null,
            profiles: HashMap::new(),
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}
