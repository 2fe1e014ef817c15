//! # kiln-bundler
//!
//! Build orchestration for client-side applications: alias resolution, an
//! ordered plugin pipeline, a shared dependency pre-bundle cache and
//! multi-target emission.
//!
//! A build is one pass through a fixed state machine:
//!
//! ```text
//! Idle -> Configuring -> Resolving -> PreBundling -> Transforming -> Emitting -> Succeeded
//!                 \___________\____________\______________\____________\-----> Failed
//! ```
//!
//! No output directory is touched before every module has been transformed
//! and every target has been rendered and checked.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use kiln_bundler::{BuildDriver, BuildRequest, PrebundleCache};
//! use kiln_config::{BuildOptions, TargetOptions};
//!
//! let options = BuildOptions::default()
//!     .with_entry("src/main.ts")
//!     .with_alias("@", "src")
//!     .with_target(TargetOptions::new("standalone", "dist"));
//!
//! let driver = BuildDriver::new(options).with_cache(Arc::new(PrebundleCache::new()));
//! let report = driver.run(&BuildRequest::build())?;
//! println!("emitted {} target(s)", report.targets.len());
//! # Ok::<(), kiln_bundler::BuildFailure>(())
//! ```

use std::path::{Path, PathBuf};

pub mod cancel;
pub mod chunk;
pub mod config;
pub mod driver;
pub mod emit;
pub mod graph;
pub mod phase;
pub mod plugins;
pub mod prebundle;
pub mod resolve;
pub mod syntax;
pub mod target;

pub use cancel::CancellationToken;
pub use config::{BuildMode, BuildRequest, ResolvedConfig};
pub use driver::{BuildDriver, BuildFailure, BuildReport, EmittedTarget};
pub use phase::{BuildPhase, BuildState};
pub use plugins::{
    Capabilities, ConfigContribution, ModuleSource, PluginPipeline, PluginStage, StageError,
    StageRegistry, TargetPatch,
};
pub use prebundle::{PrebundleCache, PrebundleError, PrebundleOutcome};
pub use resolve::{AliasResolver, AliasRule, Resolved};
pub use syntax::SyntaxError;
pub use target::{ChunkManifest, OutputTarget, resolve_targets};

pub use kiln_config::PlatformLevel;

/// Error types for kiln-bundler operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An import specifier or alias target could not be resolved.
    #[error("cannot resolve `{specifier}` from {}: {reason}", importer.display())]
    Resolution {
        specifier: String,
        importer: PathBuf,
        reason: String,
    },

    /// A plugin stage failed on a module.
    #[error("plugin stage `{stage}` failed on {}: {message}", module.display())]
    Transform {
        stage: String,
        module: PathBuf,
        message: String,
    },

    /// A module could not be parsed.
    #[error("{module}: {error}")]
    Syntax { module: String, error: SyntaxError },

    /// Dependency pre-optimization failed.
    #[error("dependency pre-bundling failed: {0}")]
    PreBundle(#[from] PrebundleError),

    /// Two output targets write to overlapping directories.
    #[error(
        "targets `{first}` and `{second}` write to overlapping directories ({})",
        dir.display()
    )]
    TargetConflict {
        first: String,
        second: String,
        dir: PathBuf,
    },

    /// Emitted code would need syntax above the target's ceiling.
    #[error(
        "{module} uses {feature} ({required}) but target `{target}` is limited to {ceiling}"
    )]
    PlatformCompatibility {
        target: String,
        module: String,
        feature: String,
        required: PlatformLevel,
        ceiling: PlatformLevel,
    },

    /// Import cycle found while `strict_cycles` is enabled.
    #[error("circular import: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// A chunk's source map could not be produced.
    #[error("source map generation failed for {file}: {message}")]
    SourceMap { file: String, message: String },

    /// Invalid configuration provided.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] kiln_config::ConfigError),

    /// Invalid output path (e.g., directory traversal attempt).
    #[error("invalid output path: {0}")]
    InvalidOutputPath(String),

    /// File write operation failed.
    #[error("write failure: {0}")]
    WriteFailure(String),

    /// The build was cancelled before it completed.
    #[error("build cancelled")]
    Cancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error with context message.
    #[error("{message}")]
    IoError {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for kiln-bundler operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(action: &str, path: &Path, source: std::io::Error) -> Self {
        Error::IoError {
            message: format!("failed to {} '{}': {}", action, path.display(), source),
            source,
        }
    }

    pub(crate) fn resolution(
        specifier: impl Into<String>,
        importer: &Path,
        reason: impl Into<String>,
    ) -> Self {
        Error::Resolution {
            specifier: specifier.into(),
            importer: importer.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Offending path or entity named by the error, if any.
    pub fn subject(&self) -> Option<String> {
        match self {
            Error::Resolution { importer, .. } => Some(importer.display().to_string()),
            Error::Transform { module, .. } => Some(module.display().to_string()),
            Error::Syntax { module, .. } => Some(module.clone()),
            Error::TargetConflict { dir, .. } => Some(dir.display().to_string()),
            Error::PlatformCompatibility { module, .. } => Some(module.clone()),
            Error::SourceMap { file, .. } => Some(file.clone()),
            Error::PreBundle(err) => err.path().map(|p| p.display().to_string()),
            _ => None,
        }
    }
}

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(match self {
            Error::Resolution { .. } => "kiln::resolution",
            Error::Transform { .. } => "kiln::transform",
            Error::Syntax { .. } => "kiln::syntax",
            Error::PreBundle(_) => "kiln::prebundle",
            Error::TargetConflict { .. } => "kiln::target_conflict",
            Error::PlatformCompatibility { .. } => "kiln::platform",
            Error::CircularDependency { .. } => "kiln::circular_dependency",
            Error::SourceMap { .. } => "kiln::sourcemap",
            Error::InvalidConfig(_) | Error::Config(_) => "kiln::config",
            Error::InvalidOutputPath(_) => "kiln::output_path",
            Error::WriteFailure(_) => "kiln::write",
            Error::Cancelled => "kiln::cancelled",
            Error::Io(_) | Error::IoError { .. } => "kiln::io",
        }))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            Error::Resolution {
                specifier,
                importer,
                ..
            } => Some(Box::new(format!(
                "Check that '{}' exists, or that an alias in `build.aliases` points at an existing path.\nImported from: {}",
                specifier,
                importer.display()
            ))),
            Error::Transform { stage, module, .. } => Some(Box::new(format!(
                "Stage '{}' rejected {}. Fix the module or disable the stage in `build.plugins`.",
                stage,
                module.display()
            ))),
            Error::Syntax { .. } => Some(Box::new(
                "Fix the syntax error, or map the file's extension to the right loader in `build.loader`.",
            )),
            Error::PreBundle(err) => Some(Box::new(format!(
                "Re-run with `optimize_deps.force = true` or delete the cache directory.\nCause: {}",
                err
            ))),
            Error::TargetConflict { first, second, .. } => Some(Box::new(format!(
                "Give targets '{}' and '{}' separate, non-nested `out_dir` values.",
                first, second
            ))),
            Error::PlatformCompatibility {
                module, required, ..
            } => Some(Box::new(format!(
                "Raise the target's `target` to {} or later, or remove the syntax from {}.",
                required, module
            ))),
            Error::CircularDependency { .. } => Some(Box::new(
                "Break the cycle or set `build.strict_cycles = false` to downgrade it to a warning.",
            )),
            Error::InvalidConfig(msg) => Some(Box::new(format!(
                "Check your configuration file.\nError: {}",
                msg
            ))),
            Error::Config(err) => err
                .hint()
                .map(|h| Box::new(h.to_string()) as Box<dyn std::fmt::Display>),
            Error::InvalidOutputPath(path) => Some(Box::new(format!(
                "The output path '{}' is invalid. Ensure it stays inside the target directory.",
                path
            ))),
            Error::WriteFailure(msg) => Some(Box::new(format!(
                "Failed to write output. Check disk space and permissions.\nError: {}",
                msg
            ))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miette::Diagnostic;

    #[test]
    fn diagnostic_codes_are_namespaced() {
        let err = Error::resolution("@/widgets/table", Path::new("/app/src/main.ts"), "not found");
        assert_eq!(err.code().unwrap().to_string(), "kiln::resolution");
        assert!(err.help().unwrap().to_string().contains("/app/src/main.ts"));
    }

    #[test]
    fn platform_error_names_module_and_levels() {
        let err = Error::PlatformCompatibility {
            target: "embedded".into(),
            module: "src/main.ts".into(),
            feature: "optional chaining".into(),
            required: PlatformLevel::ES2020,
            ceiling: PlatformLevel::ES2015,
        };
        assert_eq!(
            err.to_string(),
            "src/main.ts uses optional chaining (es2020) but target `embedded` is limited to es2015"
        );
        assert_eq!(err.subject().as_deref(), Some("src/main.ts"));
    }
}
