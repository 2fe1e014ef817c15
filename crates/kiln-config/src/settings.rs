//! Global configuration settings shared across profiles.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default)]
    pub log_level: Option<String>,

    /// Worker threads for per-module work (defaults to the number of CPUs)
    #[serde(default)]
    pub parallel_jobs: Option<usize>,
}
