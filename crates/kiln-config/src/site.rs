//! Site-wide configuration record owned by the hosting application.
//!
//! Kiln only reads it. The record is a flat JSON object; unknown keys are kept
//! so plugins can look them up.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Port of the host application's web server
    #[serde(default)]
    pub webserver_port: Option<u16>,

    /// Port of the host application's realtime server
    #[serde(default)]
    pub socketio_port: Option<u16>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SiteConfig {
    /// Read a site config JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::SiteConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| ConfigError::InvalidValue {
            field: "site_config".to_string(),
            hint: Some(format!("{}: {}", path.display(), e)),
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}
