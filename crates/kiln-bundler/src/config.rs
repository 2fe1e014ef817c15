//! The folded, per-invocation build configuration.
//!
//! `ResolvedConfig` starts from the user's `BuildOptions` and absorbs each
//! plugin stage's `configure_build` contribution in stage order. Once the
//! Configuring phase ends it is frozen behind an `Arc` and shared read-only by
//! every later phase.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use kiln_config::{BuildOptions, Loader, OptimizeDepsOptions, PlatformLevel, SiteConfig, TargetOptions};
use path_clean::PathClean;

use crate::plugins::ConfigContribution;
use crate::resolve::{AliasResolver, AliasRule};

/// How the build was invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Build,
    /// Watch mode; source maps default to on
    Dev,
}

/// One build invocation: mode plus the targets to emit (empty means all).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequest {
    pub mode: BuildMode,
    pub targets: Vec<String>,
}

impl BuildRequest {
    pub fn build() -> Self {
        Self::default()
    }

    pub fn dev() -> Self {
        Self {
            mode: BuildMode::Dev,
            targets: Vec::new(),
        }
    }

    pub fn with_targets(mut self, targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub mode: BuildMode,
    /// Absolute project root
    pub root: PathBuf,
    /// Absolute entry paths, in declaration order
    pub entries: Vec<PathBuf>,
    /// User aliases first, then plugin-contributed ones
    pub aliases: Vec<AliasRule>,
    pub external: Vec<String>,
    pub define: IndexMap<String, String>,
    pub loader: IndexMap<String, Loader>,
    pub optimize_deps: OptimizeDepsOptions,
    /// Absolute pre-bundle cache directory
    pub cache_dir: PathBuf,
    /// Declared output targets (a single default target when none are declared)
    pub targets: Vec<TargetOptions>,
    pub platform_level: PlatformLevel,
    pub sourcemap: bool,
    pub strict_cycles: bool,
    pub site: Option<SiteConfig>,
}

impl ResolvedConfig {
    /// Anchor `options` at `base_dir` (usually the directory of the config file).
    pub fn from_options(
        options: &BuildOptions,
        base_dir: &Path,
        site: Option<SiteConfig>,
        mode: BuildMode,
    ) -> Self {
        let root = base_dir.join(&options.root).clean();

        Self {
            mode,
            entries: options.entries.iter().map(|e| root.join(e).clean()).collect(),
            aliases: options
                .aliases
                .iter()
                .map(|alias| AliasRule::from_options(alias, &root))
                .collect(),
            external: options.external.clone(),
            define: options.define.clone(),
            loader: options.loader.clone(),
            optimize_deps: options.optimize_deps.clone(),
            cache_dir: root.join(&options.cache.dir).clean(),
            targets: options.effective_targets(),
            platform_level: options.target,
            sourcemap: options.sourcemap,
            strict_cycles: options.strict_cycles,
            site,
            root,
        }
    }

    /// Fold one stage's contribution.
    ///
    /// Contributions only add: aliases go after the existing ones, and keys
    /// already present in `define`, `loader` or a target are left alone.
    pub fn apply(&mut self, contribution: ConfigContribution) {
        for alias in contribution.aliases {
            let rule = AliasRule::from_options(&alias, &self.root);
            self.aliases.push(rule);
        }

        for (key, value) in contribution.define {
            self.define.entry(key).or_insert(value);
        }

        for (ext, loader) in contribution.loader {
            self.loader.entry(ext).or_insert(loader);
        }

        for dep in contribution.optimize_include {
            if !self.optimize_deps.include.contains(&dep) {
                self.optimize_deps.include.push(dep);
            }
        }

        if let Some(patch) = contribution.target {
            for target in &mut self.targets {
                if target.target.is_none() {
                    target.target = patch.platform_level;
                }
                if target.sourcemap.is_none() {
                    target.sourcemap = patch.source_maps;
                }
                for (chunk, members) in &patch.manual_chunks {
                    if !target.manual_chunks.contains_key(chunk) {
                        target.manual_chunks.insert(chunk.clone(), members.clone());
                    }
                }
            }
        }
    }

    /// Loader for a file, honoring `build.loader` overrides.
    pub fn loader_for(&self, path: &Path) -> Option<Loader> {
        let ext = path.extension()?.to_str()?;
        self.loader
            .get(ext)
            .copied()
            .or_else(|| Loader::for_extension(ext))
    }

    pub fn resolver(&self) -> AliasResolver {
        AliasResolver::new(self.root.clone(), self.aliases.clone(), self.external.clone())
    }

    /// Path relative to the root with forward slashes, for diagnostics and manifests.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::TargetPatch;
    use crate::resolve::AliasTarget;
    use kiln_config::AliasOptions;

    fn options() -> BuildOptions {
        BuildOptions::default()
            .with_entry("src/main.ts")
            .with_alias("@", "/abs/src")
            .with_target(TargetOptions::new("standalone", "dist"))
            .with_target(
                TargetOptions::new("embedded", "public/app").with_level(PlatformLevel::ES2015),
            )
    }

    #[test]
    fn paths_are_anchored_at_base_dir() {
        let config = ResolvedConfig::from_options(&options(), Path::new("/project"), None, BuildMode::Build);
        assert_eq!(config.root, PathBuf::from("/project"));
        assert_eq!(config.entries, vec![PathBuf::from("/project/src/main.ts")]);
        assert_eq!(config.cache_dir, PathBuf::from("/project/node_modules/.kiln"));
        assert_eq!(config.aliases[0].target, AliasTarget::Path("/abs/src".into()));
    }

    #[test]
    fn contributions_append_and_never_override() {
        let mut opts = options();
        opts.define.insert("__VERSION__".into(), "\"1\"".into());
        let mut config = ResolvedConfig::from_options(&opts, Path::new("/project"), None, BuildMode::Build);

        let mut patch = TargetPatch {
            platform_level: Some(PlatformLevel::ES2017),
            ..Default::default()
        };
        patch.manual_chunks.insert("frappe-ui".into(), vec!["frappe-ui".into()]);

        let mut contribution = ConfigContribution::default();
        contribution.aliases.push(AliasOptions::new("@", "/other"));
        contribution.define.insert("__VERSION__".into(), "\"2\"".into());
        contribution.define.insert("__PORT__".into(), "8000".into());
        contribution.optimize_include.push("showdown".into());
        contribution.target = Some(patch);
        config.apply(contribution);

        assert_eq!(config.aliases.len(), 2);
        assert_eq!(config.aliases[0].target, AliasTarget::Path("/abs/src".into()));
        assert_eq!(config.define["__VERSION__"], "\"1\"");
        assert_eq!(config.define["__PORT__"], "8000");
        assert_eq!(config.optimize_deps.include, vec!["showdown"]);
        assert_eq!(config.targets[0].target, Some(PlatformLevel::ES2017));
        assert_eq!(config.targets[1].target, Some(PlatformLevel::ES2015));
        assert!(config.targets[1].manual_chunks.contains_key("frappe-ui"));
    }

    #[test]
    fn loader_overrides_take_priority() {
        let mut opts = options();
        opts.loader.insert("js".into(), Loader::Tsx);
        let config = ResolvedConfig::from_options(&opts, Path::new("/project"), None, BuildMode::Build);
        assert_eq!(config.loader_for(Path::new("a.js")), Some(Loader::Tsx));
        assert_eq!(config.loader_for(Path::new("a.vue")), Some(Loader::Vue));
        assert_eq!(config.loader_for(Path::new("a.css")), None);
    }
}
