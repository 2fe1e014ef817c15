//! Plugin stages and the pipeline that drives them.
//!
//! A stage declares which hooks it implements through [`Capabilities`]; the
//! pipeline only ever calls declared hooks. Stages run in the order they were
//! listed in `build.plugins`, with stages registered by a meta-plugin inserted
//! directly after it.

pub mod builtin;
mod pipeline;
mod registry;

use std::ops::BitOr;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use kiln_config::{AliasOptions, Loader, PlatformLevel};
use std::sync::Arc;

use crate::config::ResolvedConfig;
use crate::resolve::Resolved;

pub use pipeline::PluginPipeline;
pub use registry::{StageFactory, StageRegistry};

/// Set of hooks a stage implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    pub const CONFIGURE_BUILD: Capabilities = Capabilities(1);
    pub const RESOLVE_ID: Capabilities = Capabilities(1 << 1);
    pub const TRANSFORM: Capabilities = Capabilities(1 << 2);

    pub fn contains(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        Capabilities(self.0 | rhs.0)
    }
}

/// Failure reported by a stage hook. The pipeline attaches stage and module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StageError {
    pub message: String,
}

impl StageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for StageError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for StageError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Target settings a stage may fill in. Only unset values are touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetPatch {
    pub platform_level: Option<PlatformLevel>,
    pub source_maps: Option<bool>,
    pub manual_chunks: IndexMap<String, Vec<String>>,
}

/// What a `configure_build` hook adds to the build configuration.
#[derive(Default)]
pub struct ConfigContribution {
    pub aliases: Vec<AliasOptions>,
    pub define: IndexMap<String, String>,
    pub loader: IndexMap<String, Loader>,
    pub optimize_include: Vec<String>,
    pub target: Option<TargetPatch>,
    /// Further stages, inserted right after the contributing stage
    pub stages: Vec<Arc<dyn PluginStage>>,
}

impl std::fmt::Debug for ConfigContribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigContribution")
            .field("aliases", &self.aliases)
            .field("define", &self.define)
            .field("loader", &self.loader)
            .field("optimize_include", &self.optimize_include)
            .field("target", &self.target)
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// A module as it flows through the transform hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    pub path: PathBuf,
    pub loader: Loader,
    pub code: String,
}

impl ModuleSource {
    pub fn new(path: impl Into<PathBuf>, loader: Loader, code: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            loader,
            code: code.into(),
        }
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|e| e.to_str())
    }
}

/// A source-transform stage.
///
/// Hooks a stage does not declare in [`PluginStage::capabilities`] are never
/// called, so their default bodies only matter for documentation.
pub trait PluginStage: Send + Sync {
    /// Name used in diagnostics and for de-duplication.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Runs once before any module is processed, in stage order.
    fn configure_build(&self, _config: &ResolvedConfig) -> Result<ConfigContribution, StageError> {
        Ok(ConfigContribution::default())
    }

    /// Claim a specifier. `Ok(None)` declines and lets the next stage try.
    fn resolve_id(
        &self,
        _specifier: &str,
        _importer: &Path,
        _config: &ResolvedConfig,
    ) -> Result<Option<Resolved>, StageError> {
        Ok(None)
    }

    /// Rewrite a module. `Ok(None)` passes it through unchanged.
    fn transform(
        &self,
        _module: &ModuleSource,
        _config: &ResolvedConfig,
    ) -> Result<Option<String>, StageError> {
        Ok(None)
    }
}
