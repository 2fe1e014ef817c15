//! Output target resolution.
//!
//! All declared targets are checked against each other, not just the
//! requested ones: two targets sharing a directory are a configuration error
//! regardless of which one a given invocation emits.

pub mod platform;

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use kiln_config::PlatformLevel;
use path_clean::PathClean;

use crate::config::{BuildMode, BuildRequest, ResolvedConfig};
use crate::{Error, Result};

pub use platform::{Feature, check_module, detect_features};

/// Manual chunk groups of one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkManifest {
    groups: IndexMap<String, Vec<String>>,
}

impl ChunkManifest {
    pub fn new(groups: IndexMap<String, Vec<String>>) -> Self {
        let groups = groups
            .into_iter()
            .map(|(chunk, members)| {
                let members = members
                    .into_iter()
                    .map(|m| m.trim_start_matches("./").to_string())
                    .collect();
                (chunk, members)
            })
            .collect();
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Manual chunk of a third-party import. An exact `pkg/sub` member beats
    /// a bare package-name member.
    pub fn chunk_for_package(&self, id: &str, name: &str) -> Option<&str> {
        self.find(|member| member == id)
            .or_else(|| self.find(|member| member == name))
    }

    /// Manual chunk of a first-party module, by root-relative path with or
    /// without its extension.
    pub fn chunk_for_module(&self, id: &str) -> Option<&str> {
        let stem = Path::new(id).with_extension("");
        let stem = stem.to_string_lossy().replace('\\', "/");
        self.find(|member| member == id || member == stem)
    }

    fn find(&self, pred: impl Fn(&str) -> bool) -> Option<&str> {
        self.groups
            .iter()
            .find(|(_, members)| members.iter().any(|m| pred(m)))
            .map(|(chunk, _)| chunk.as_str())
    }
}

/// Fully resolved output target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub name: String,
    /// Absolute output directory
    pub out_dir: PathBuf,
    pub empty_before_write: bool,
    pub platform_level: PlatformLevel,
    pub source_maps: bool,
    /// Public URL prefix, always ending in `/`
    pub base: String,
    pub chunk_manifest: ChunkManifest,
}

/// Targets for one invocation, in declaration order.
///
/// An empty `request.targets` selects every declared target. Fails on
/// unknown names, overlapping output directories, or a clearing target whose
/// directory would contain the project root.
pub fn resolve_targets(config: &ResolvedConfig, request: &BuildRequest) -> Result<Vec<OutputTarget>> {
    let all: Vec<OutputTarget> = config
        .targets
        .iter()
        .map(|opts| OutputTarget {
            name: opts.name.clone(),
            out_dir: config.root.join(&opts.out_dir).clean(),
            empty_before_write: opts.empty_out_dir,
            platform_level: opts.target.unwrap_or(config.platform_level),
            source_maps: opts
                .sourcemap
                .unwrap_or(config.sourcemap || config.mode == BuildMode::Dev),
            base: normalize_base(&opts.base),
            chunk_manifest: ChunkManifest::new(opts.manual_chunks.clone()),
        })
        .collect();

    check_conflicts(&all)?;

    for target in &all {
        if target.empty_before_write && config.root.starts_with(&target.out_dir) {
            return Err(Error::InvalidOutputPath(format!(
                "target `{}` would clear {}, which contains the project root",
                target.name,
                target.out_dir.display()
            )));
        }
        if target.empty_before_write && config.cache_dir.starts_with(&target.out_dir) {
            return Err(Error::InvalidOutputPath(format!(
                "target `{}` would clear the pre-bundle cache at {}",
                target.name,
                config.cache_dir.display()
            )));
        }
    }

    if request.targets.is_empty() {
        return Ok(all);
    }

    for name in &request.targets {
        if !all.iter().any(|t| &t.name == name) {
            let known: Vec<&str> = all.iter().map(|t| t.name.as_str()).collect();
            return Err(Error::InvalidConfig(format!(
                "unknown target `{}` (declared: {})",
                name,
                known.join(", ")
            )));
        }
    }

    Ok(all
        .into_iter()
        .filter(|t| request.targets.contains(&t.name))
        .collect())
}

fn check_conflicts(targets: &[OutputTarget]) -> Result<()> {
    for (i, first) in targets.iter().enumerate() {
        for second in &targets[i + 1..] {
            let overlap = if second.out_dir.starts_with(&first.out_dir) {
                Some(&second.out_dir)
            } else if first.out_dir.starts_with(&second.out_dir) {
                Some(&first.out_dir)
            } else {
                None
            };
            if let Some(dir) = overlap {
                return Err(Error::TargetConflict {
                    first: first.name.clone(),
                    second: second.name.clone(),
                    dir: dir.clone(),
                });
            }
        }
    }
    Ok(())
}

fn normalize_base(base: &str) -> String {
    if base.is_empty() {
        "/".to_string()
    } else if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::{BuildOptions, TargetOptions};

    fn config(targets: Vec<TargetOptions>) -> ResolvedConfig {
        let mut options = BuildOptions::default().with_entry("src/main.ts");
        options.targets = targets;
        ResolvedConfig::from_options(&options, Path::new("/project"), None, BuildMode::Build)
    }

    #[test]
    fn duplicate_directories_conflict() {
        let config = config(vec![
            TargetOptions::new("standalone", "/dist"),
            TargetOptions::new("embedded", "/dist"),
        ]);
        let err = resolve_targets(&config, &BuildRequest::build()).unwrap_err();
        match err {
            Error::TargetConflict { first, second, dir } => {
                assert_eq!((first.as_str(), second.as_str()), ("standalone", "embedded"));
                assert_eq!(dir, PathBuf::from("/dist"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn nested_directories_conflict_even_when_not_requested() {
        let config = config(vec![
            TargetOptions::new("standalone", "dist"),
            TargetOptions::new("embedded", "dist/embedded"),
        ]);
        let request = BuildRequest::build().with_targets(["standalone"]);
        assert!(matches!(
            resolve_targets(&config, &request),
            Err(Error::TargetConflict { .. })
        ));
    }

    #[test]
    fn resolves_levels_maps_and_selection() {
        let mut config = config(vec![
            TargetOptions::new("standalone", "dist").with_sourcemap(true),
            TargetOptions::new("embedded", "../public/cdnLocal/apps/report-viewer")
                .with_level(PlatformLevel::ES2015)
                .with_manual_chunk("frappe-ui", ["frappe-ui"]),
        ]);
        config.platform_level = PlatformLevel::ES2020;

        let targets = resolve_targets(&config, &BuildRequest::build()).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].platform_level, PlatformLevel::ES2020);
        assert!(targets[0].source_maps);
        assert_eq!(targets[1].out_dir, PathBuf::from("/public/cdnLocal/apps/report-viewer"));
        assert_eq!(targets[1].platform_level, PlatformLevel::ES2015);
        assert!(!targets[1].source_maps);
        assert_eq!(targets[1].base, "/");

        let only = resolve_targets(&config, &BuildRequest::build().with_targets(["embedded"])).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].name, "embedded");

        let err = resolve_targets(&config, &BuildRequest::build().with_targets(["cdn"])).unwrap_err();
        assert!(err.to_string().contains("standalone, embedded"));
    }

    #[test]
    fn dev_mode_defaults_maps_on() {
        let mut config = config(vec![TargetOptions::new("standalone", "dist")]);
        config.mode = BuildMode::Dev;
        let targets = resolve_targets(&config, &BuildRequest::dev()).unwrap();
        assert!(targets[0].source_maps);
    }

    #[test]
    fn refuses_to_clear_the_project_root() {
        let config = config(vec![TargetOptions::new("oops", ".")]);
        assert!(matches!(
            resolve_targets(&config, &BuildRequest::build()),
            Err(Error::InvalidOutputPath(_))
        ));
    }

    #[test]
    fn manual_chunk_membership() {
        let manifest = ChunkManifest::new(IndexMap::from([
            ("charts".to_string(), vec!["vendor/chart".to_string()]),
            ("vendor-all".to_string(), vec!["vendor".to_string()]),
            ("widgets".to_string(), vec!["./src/widgets/table".to_string()]),
        ]));
        assert_eq!(manifest.chunk_for_package("vendor/chart", "vendor"), Some("charts"));
        assert_eq!(manifest.chunk_for_package("vendor/map", "vendor"), Some("vendor-all"));
        assert_eq!(manifest.chunk_for_package("showdown", "showdown"), None);
        assert_eq!(manifest.chunk_for_module("src/widgets/table.ts"), Some("widgets"));
        assert_eq!(manifest.chunk_for_module("src/main.ts"), None);
    }
}
