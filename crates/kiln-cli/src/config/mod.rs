//! Project configuration for CLI commands.
//!
//! See [`loading`] for how the layers are combined.

mod loading;

use std::path::{Path, PathBuf};

use kiln_config::{DevConfig, KilnConfig, SiteConfig};

pub use loading::{CliOverrides, load_project};

/// A loaded, validated project.
#[derive(Debug, Clone)]
pub struct Project {
    pub config: KilnConfig,
    /// Directory `build.root` is relative to: the config file's directory
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub site: Option<SiteConfig>,
}

impl Project {
    /// Absolute project root.
    pub fn root(&self) -> PathBuf {
        resolve_path(&self.config.build.root, &self.base_dir)
    }

    pub fn dev(&self) -> DevConfig {
        self.config.dev.clone().unwrap_or_default()
    }
}

/// `path` if absolute, otherwise joined onto `cwd`.
pub fn resolve_path(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else if path == Path::new(".") {
        cwd.to_path_buf()
    } else {
        cwd.join(path)
    }
}
