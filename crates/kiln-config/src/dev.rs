//! Watch-mode configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for a co-located dev server; falls back to the site config
    #[serde(default)]
    pub port: Option<u16>,

    /// Extra paths to watch in addition to the build root
    #[serde(default)]
    pub watch_paths: Vec<PathBuf>,

    /// Path fragments ignored by the watcher
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            watch_paths: Vec::new(),
            ignore: default_ignore(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_ignore() -> Vec<String> {
    vec!["node_modules".into(), "dist".into(), "*.log".into()]
}

fn default_debounce_ms() -> u64 {
    100
}
