//! `_metadata.json` of a pre-bundle cache entry.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::PrebundleError;

pub const METADATA_FILE: &str = "_metadata.json";

/// One optimized dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepRecord {
    /// Artifact file name inside the entry directory
    pub file: String,
    /// Installed version, when the package declares one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Entry file the artifact was built from
    pub entry: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrebundleMetadata {
    pub fingerprint: String,
    pub kiln_version: String,
    pub deps: BTreeMap<String, DepRecord>,
}

impl PrebundleMetadata {
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            kiln_version: super::fingerprint::KILN_VERSION.to_string(),
            deps: BTreeMap::new(),
        }
    }

    pub fn read(dir: &Path) -> Result<Self, PrebundleError> {
        let path = dir.join(METADATA_FILE);
        let content = fs::read_to_string(&path).map_err(|source| PrebundleError::Io {
            action: "read",
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| PrebundleError::Metadata {
            path,
            message: e.to_string(),
        })
    }

    pub fn write(&self, dir: &Path) -> Result<(), PrebundleError> {
        let path = dir.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| PrebundleError::Metadata {
            path: path.clone(),
            message: e.to_string(),
        })?;
        fs::write(&path, json).map_err(|source| PrebundleError::Io {
            action: "write",
            path,
            source,
        })
    }

    /// The entry is usable: same fingerprint and every listed artifact on disk.
    pub fn is_intact(&self, dir: &Path, fingerprint: &str) -> bool {
        self.fingerprint == fingerprint && self.deps.values().all(|dep| dir.join(&dep.file).is_file())
    }

    pub fn covers<'a>(&self, ids: impl IntoIterator<Item = &'a String>) -> bool {
        ids.into_iter().all(|id| self.deps.contains_key(id))
    }
}

/// Read and check the metadata of `dir`; `None` when the entry cannot be reused.
pub fn load_valid(dir: &Path, fingerprint: &str) -> Option<PrebundleMetadata> {
    if !dir.is_dir() {
        return None;
    }
    match PrebundleMetadata::read(dir) {
        Ok(metadata) if metadata.is_intact(dir, fingerprint) => Some(metadata),
        Ok(_) => {
            tracing::debug!(dir = %dir.display(), "pre-bundle entry is stale");
            None
        }
        Err(err) => {
            tracing::debug!(dir = %dir.display(), %err, "pre-bundle metadata unreadable");
            None
        }
    }
}

/// Artifact file name: `@scope/pkg/sub` becomes `@scope_pkg_sub.js`.
pub fn flatten_name(id: &str) -> String {
    format!("{}.js", id.replace('/', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn flattens_scoped_and_deep_ids() {
        assert_eq!(flatten_name("showdown"), "showdown.js");
        assert_eq!(flatten_name("vendor/chart"), "vendor_chart.js");
        assert_eq!(flatten_name("@vue/shared"), "@vue_shared.js");
    }

    #[test]
    fn missing_artifact_invalidates_entry() {
        let dir = TempDir::new().unwrap();
        let mut metadata = PrebundleMetadata::new("abc");
        metadata.deps.insert(
            "showdown".into(),
            DepRecord {
                file: flatten_name("showdown"),
                version: Some("2.1.0".into()),
                entry: PathBuf::from("/app/node_modules/showdown/dist/showdown.js"),
            },
        );
        metadata.write(dir.path()).unwrap();
        assert!(load_valid(dir.path(), "abc").is_none());

        fs::write(dir.path().join("showdown.js"), "").unwrap();
        let loaded = load_valid(dir.path(), "abc").unwrap();
        assert_eq!(loaded, metadata);
        assert!(load_valid(dir.path(), "other").is_none());
    }

    #[test]
    fn coverage_checks_every_id() {
        let mut metadata = PrebundleMetadata::new("abc");
        metadata.deps.insert(
            "vue".into(),
            DepRecord {
                file: "vue.js".into(),
                version: None,
                entry: PathBuf::from("/x"),
            },
        );
        assert!(metadata.covers(&["vue".to_string()]));
        assert!(!metadata.covers(&["vue".to_string(), "showdown".to_string()]));
    }
}
