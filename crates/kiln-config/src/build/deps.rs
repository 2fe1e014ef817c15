use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::build::helpers::default_cache_dir;

/// Dependency pre-bundling options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeDepsOptions {
    /// Packages always pre-bundled, even when not discovered from an entry
    #[serde(default)]
    pub include: Vec<String>,

    /// Packages never pre-bundled (served from their original location)
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Rebuild the cache entry even when the fingerprint matches
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Directory holding the shared pre-bundle cache (relative to root)
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}
