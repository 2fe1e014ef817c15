use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::build::helpers::{default_base, default_out_dir, default_target_name, default_true};
use crate::build::types::PlatformLevel;

/// One output target (a standalone app, an embedded sub-app, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOptions {
    /// Name used to request the target from the command line
    #[serde(default = "default_target_name")]
    pub name: String,

    /// Output directory (relative to `build.root` or absolute)
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Clear the output directory when the new artifacts are committed
    #[serde(default = "default_true")]
    pub empty_out_dir: bool,

    /// Syntax ceiling for emitted code
    #[serde(default)]
    pub target: Option<PlatformLevel>,

    /// Emit a source map for every chunk
    #[serde(default)]
    pub sourcemap: Option<bool>,

    /// Public URL prefix the target is served from
    #[serde(default = "default_base")]
    pub base: String,

    /// Manual chunk groups: chunk name to module specifiers
    #[serde(default)]
    pub manual_chunks: IndexMap<String, Vec<String>>,
}

impl TargetOptions {
    pub fn new(name: impl Into<String>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            out_dir: out_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_manual_chunk(
        mut self,
        chunk: impl Into<String>,
        members: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.manual_chunks
            .insert(chunk.into(), members.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_level(mut self, level: PlatformLevel) -> Self {
        self.target = Some(level);
        self
    }

    pub fn with_sourcemap(mut self, enabled: bool) -> Self {
        self.sourcemap = Some(enabled);
        self
    }

    pub fn with_empty_out_dir(mut self, empty: bool) -> Self {
        self.empty_out_dir = empty;
        self
    }
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            name: default_target_name(),
            out_dir: default_out_dir(),
            empty_out_dir: true,
            target: None,
            sourcemap: None,
            base: default_base(),
            manual_chunks: IndexMap::new(),
        }
    }
}
