//! Build configuration types shared across Kiln crates.

mod alias;
mod deps;
mod helpers;
mod plugin;
mod target;
mod types;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

pub use alias::AliasOptions;
pub use deps::{CacheOptions, OptimizeDepsOptions};
pub use plugin::PluginOptions;
pub use target::TargetOptions;
pub use types::{Loader, PlatformLevel};

use helpers::default_root;

/// Main build configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Project root; relative paths in this section resolve against it
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Entry points (relative to root)
    #[serde(default)]
    pub entries: Vec<PathBuf>,

    /// Import aliases, first match wins
    #[serde(default)]
    pub aliases: Vec<AliasOptions>,

    /// Specifiers left as runtime imports (exact or `pkg/...` prefix)
    #[serde(default)]
    pub external: Vec<String>,

    /// Compile-time constant replacements (identifier to JS expression)
    #[serde(default)]
    pub define: IndexMap<String, String>,

    /// Loader overrides by extension, e.g. `js = "tsx"`
    #[serde(default)]
    pub loader: IndexMap<String, Loader>,

    /// Plugin stages in execution order
    #[serde(default)]
    pub plugins: Vec<PluginOptions>,

    /// Dependency pre-bundling
    #[serde(default)]
    pub optimize_deps: OptimizeDepsOptions,

    /// Shared cache location
    #[serde(default)]
    pub cache: CacheOptions,

    /// Output targets; one `default` target writing to `dist` when empty
    #[serde(default)]
    pub targets: Vec<TargetOptions>,

    /// Syntax ceiling for targets that don't set their own
    #[serde(default)]
    pub target: PlatformLevel,

    /// Source maps for targets that don't set their own
    #[serde(default)]
    pub sourcemap: bool,

    /// Treat import cycles as errors instead of warnings
    #[serde(default)]
    pub strict_cycles: bool,
}

impl BuildOptions {
    /// Create from serde_json::Value (for programmatic config)
    ///
    /// # Example
    ///
    /// ```
    /// use kiln_config::BuildOptions;
    /// use serde_json::json;
    /// use std::path::PathBuf;
    ///
    /// let value = json!({
    ///     "entries": ["src/main.ts"],
    ///     "aliases": [{ "find": "@", "replacement": "src" }]
    /// });
    ///
    /// let options = BuildOptions::from_value(value).unwrap();
    /// assert_eq!(options.entries, vec![PathBuf::from("src/main.ts")]);
    /// assert_eq!(options.aliases[0].find, "@");
    /// ```
    pub fn from_value(value: Value) -> Result<Self, crate::error::ConfigError> {
        serde_json::from_value(value).map_err(|e| crate::error::ConfigError::InvalidValue {
            field: "build".to_string(),
            hint: Some(e.to_string()),
        })
    }

    /// Convert to serde_json::Value
    pub fn to_value(&self) -> Result<Value, crate::error::ConfigError> {
        serde_json::to_value(self).map_err(|e| crate::error::ConfigError::InvalidValue {
            field: "build".to_string(),
            hint: Some(e.to_string()),
        })
    }

    /// Add an alias after the existing ones
    ///
    /// # Example
    /// ```
    /// use kiln_config::BuildOptions;
    ///
    /// let options = BuildOptions::default()
    ///     .with_alias("@", "src")
    ///     .with_alias("~icons", "src/assets/icons");
    /// assert_eq!(options.aliases.len(), 2);
    /// ```
    pub fn with_alias(mut self, find: impl Into<String>, replacement: impl Into<PathBuf>) -> Self {
        self.aliases.push(AliasOptions::new(find, replacement));
        self
    }

    pub fn with_entry(mut self, entry: impl Into<PathBuf>) -> Self {
        self.entries.push(entry.into());
        self
    }

    pub fn with_target(mut self, target: TargetOptions) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_plugin(mut self, plugin: PluginOptions) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Targets to consider, falling back to a single default target
    pub fn effective_targets(&self) -> Vec<TargetOptions> {
        if self.targets.is_empty() {
            vec![TargetOptions::default()]
        } else {
            self.targets.clone()
        }
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            root: default_root(),
            entries: vec![],
            aliases: vec![],
            external: vec![],
            define: IndexMap::new(),
            loader: IndexMap::new(),
            plugins: vec![],
            optimize_deps: OptimizeDepsOptions::default(),
            cache: CacheOptions::default(),
            targets: vec![],
            target: PlatformLevel::default(),
            sourcemap: false,
            strict_cycles: false,
        }
    }
}
