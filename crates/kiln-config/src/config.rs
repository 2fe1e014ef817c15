//! Top-level configuration structure for Kiln.
//!
//! This module provides the main `KilnConfig` struct and profile merging logic.
//! For file discovery, see the `discovery` module.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::build::{BuildOptions, PluginOptions};
use crate::dev::DevConfig;
use crate::error::{ConfigError, Result as ConfigResult};
use crate::settings::GlobalSettings;
use crate::site::SiteConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KilnConfig {
    #[serde(default)]
    pub build: BuildOptions,

    #[serde(default)]
    pub dev: Option<DevConfig>,

    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,

    #[serde(default)]
    pub settings: GlobalSettings,

    /// Path to the host application's site config JSON (relative to `build.root`)
    #[serde(default)]
    pub site_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub build: Value,

    #[serde(default)]
    pub dev: Value,

    #[serde(default)]
    pub settings: Value,
}

impl KilnConfig {
    /// Create from serde_json::Value
    ///
    /// # Example
    ///
    /// ```
    /// use kiln_config::KilnConfig;
    /// use serde_json::json;
    /// use std::path::PathBuf;
    ///
    /// let value = json!({
    ///     "build": {
    ///         "entries": ["src/main.ts"],
    ///         "strict_cycles": true
    ///     }
    /// });
    ///
    /// let config = KilnConfig::from_value(value).unwrap();
    /// assert_eq!(config.build.entries, vec![PathBuf::from("src/main.ts")]);
    /// assert!(config.build.strict_cycles);
    /// ```
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        serde_json::from_value(value).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(e.to_string()),
        })
    }

    /// Convert to serde_json::Value
    pub fn to_value(&self) -> ConfigResult<Value> {
        serde_json::to_value(self).map_err(|e| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(e.to_string()),
        })
    }

    /// Load the site config record, if one is configured.
    ///
    /// Relative paths resolve against `base`.
    pub fn load_site_config(&self, base: &Path) -> ConfigResult<Option<SiteConfig>> {
        let Some(path) = &self.site_config else {
            return Ok(None);
        };
        let path = if path.is_absolute() {
            path.clone()
        } else {
            base.join(path)
        };
        SiteConfig::load(&path).map(Some)
    }
}

impl KilnConfig {
    /// Fold the named profile over the base sections.
    ///
    /// Objects merge key by key; arrays and scalars replace.
    pub fn materialize_profile(mut self, profile: Option<&str>) -> ConfigResult<Self> {
        let Some(name) = profile else {
            return Ok(self);
        };

        let Some(profile_cfg) = self.profiles.get(name).cloned() else {
            return Err(ConfigError::UnknownProfile(name.to_string()));
        };

        if !profile_cfg.build.is_null() {
            self.build = merge_section(&self.build, &profile_cfg.build)?;
        }

        if !profile_cfg.dev.is_null() {
            let mut base = match &self.dev {
                Some(dev) => to_override_value(dev)?,
                None => Value::Null,
            };
            merge_values(&mut base, &profile_cfg.dev);
            self.dev = if base.is_null() {
                None
            } else {
                Some(from_override_value(base)?)
            };
        }

        if !profile_cfg.settings.is_null() {
            self.settings = merge_section(&self.settings, &profile_cfg.settings)?;
        }

        apply_plugin_profiles(&mut self.build.plugins, name)?;
        tracing::debug!(profile = name, "materialized config profile");

        Ok(self)
    }
}

fn merge_section<T>(base: &T, update: &Value) -> ConfigResult<T>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    let mut merged = to_override_value(base)?;
    merge_values(&mut merged, update);
    from_override_value(merged)
}

fn to_override_value<T: Serialize>(value: &T) -> ConfigResult<Value> {
    serde_json::to_value(value).map_err(|err| ConfigError::InvalidProfileOverride {
        message: err.to_string(),
    })
}

fn from_override_value<T: serde::de::DeserializeOwned>(value: Value) -> ConfigResult<T> {
    serde_json::from_value(value).map_err(|err| ConfigError::InvalidProfileOverride {
        message: err.to_string(),
    })
}

/// Deep-merge `update` into `target`.
pub fn merge_values(target: &mut Value, update: &Value) {
    match (target, update) {
        (Value::Object(target_map), Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_values(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target_slot, _) => {
            *target_slot = update.clone();
        }
    }
}

fn apply_plugin_profiles(plugins: &mut [PluginOptions], profile: &str) -> ConfigResult<()> {
    for plugin in plugins {
        let Some(overrides) = plugin.profiles.get(profile).cloned() else {
            continue;
        };

        if overrides.is_null() {
            continue;
        }

        let original_profiles = std::mem::take(&mut plugin.profiles);
        let mut updated: PluginOptions = merge_section(&*plugin, &overrides)?;
        updated.profiles = original_profiles;
        *plugin = updated;
    }

    Ok(())
}
