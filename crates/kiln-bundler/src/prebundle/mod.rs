//! Shared dependency pre-bundle cache.
//!
//! Third-party imports discovered from the entry points are flattened into
//! one artifact each under `<cache>/deps/<fingerprint>/`. The cache object is
//! created by the embedder and passed to every build that should share it;
//! there is no ambient global.
//!
//! Requesters for the same fingerprint coalesce at two levels:
//! - in-process through a `OnceCell` per fingerprint, so concurrent builds
//!   wait for the first one's rebuild
//! - across processes through an exclusive file lock, with the metadata
//!   re-checked once the lock is held

pub mod fingerprint;
mod lock;
pub mod manifest;
mod optimize;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use kiln_config::OptimizeDepsOptions;
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, info};

pub use lock::CacheLock;
pub use manifest::{DepRecord, PrebundleMetadata, flatten_name};
pub use optimize::{flatten_package, package_root};

/// Errors raised while pre-bundling dependencies.
#[derive(Debug, thiserror::Error)]
pub enum PrebundleError {
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to lock the pre-bundle cache at {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid metadata at {}: {message}", path.display())]
    Metadata { path: PathBuf, message: String },

    #[error("cannot pre-bundle `{name}`: {reason}")]
    Dependency { name: String, reason: String },
}

impl PrebundleError {
    /// File or directory the error is about, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            PrebundleError::Io { path, .. }
            | PrebundleError::Lock { path, .. }
            | PrebundleError::Metadata { path, .. } => Some(path),
            PrebundleError::Dependency { .. } => None,
        }
    }
}

/// How a build's dependencies were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrebundleOutcome {
    /// A valid entry for the fingerprint was reused
    Hit,
    /// The entry was (re)built by this request
    Rebuilt,
    /// Nothing to pre-bundle
    Skipped,
}

/// One dependency to optimize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepRequest {
    pub name: String,
    pub entry: PathBuf,
}

/// Input of [`PrebundleCache::prebundle`].
#[derive(Debug, Clone)]
pub struct PrebundleRequest {
    /// Project root holding `package.json` and the lockfile
    pub root: PathBuf,
    pub cache_dir: PathBuf,
    /// Import id to dependency, already filtered by `optimize_deps.exclude`
    pub deps: BTreeMap<String, DepRequest>,
    pub options: OptimizeDepsOptions,
}

impl PrebundleRequest {
    pub fn deps_dir(&self) -> PathBuf {
        self.cache_dir.join("deps")
    }
}

/// A usable cache entry.
#[derive(Debug, Clone)]
pub struct PrebundleEntry {
    pub fingerprint: String,
    pub dir: PathBuf,
    pub metadata: PrebundleMetadata,
}

impl PrebundleEntry {
    pub fn artifact_path(&self, id: &str) -> Option<PathBuf> {
        self.metadata.deps.get(id).map(|dep| self.dir.join(&dep.file))
    }

    pub fn read_artifact(&self, id: &str) -> Result<String, PrebundleError> {
        let path = self.artifact_path(id).ok_or_else(|| PrebundleError::Dependency {
            name: id.to_string(),
            reason: format!("not present in pre-bundle entry {}", self.fingerprint),
        })?;
        fs::read_to_string(&path).map_err(|source| PrebundleError::Io {
            action: "read",
            path,
            source,
        })
    }

    fn is_usable(&self, request: &PrebundleRequest) -> bool {
        self.metadata.covers(request.deps.keys())
            && self.metadata.is_intact(&self.dir, &self.fingerprint)
    }
}

/// Result of one pre-bundle request.
#[derive(Debug, Clone)]
pub struct Prebundled {
    pub outcome: PrebundleOutcome,
    pub entry: Option<Arc<PrebundleEntry>>,
}

/// Process-wide pre-bundle cache. Share it between builds with an `Arc`.
#[derive(Debug, Default)]
pub struct PrebundleCache {
    cells: DashMap<String, Arc<OnceCell<Arc<PrebundleEntry>>>>,
    rebuilds: AtomicUsize,
}

impl PrebundleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries this cache object has (re)built.
    pub fn rebuild_count(&self) -> usize {
        self.rebuilds.load(Ordering::SeqCst)
    }

    /// Forget every in-memory entry. On-disk entries stay valid.
    pub fn clear(&self) {
        self.cells.clear();
    }

    /// Make sure an entry covering `request.deps` exists for the current
    /// fingerprint, building it if needed. Blocks while another requester
    /// builds the same fingerprint.
    pub fn prebundle(&self, request: &PrebundleRequest) -> Result<Prebundled, PrebundleError> {
        if request.deps.is_empty() {
            return Ok(Prebundled {
                outcome: PrebundleOutcome::Skipped,
                entry: None,
            });
        }

        let fingerprint = fingerprint::compute(&request.root, &request.options)?;
        let key = format!("{}#{}", request.deps_dir().display(), fingerprint);
        let force = request.options.force;
        if force {
            self.cells.remove(&key);
        }

        // A cached entry may predate new imports or lose files on disk; drop
        // it once and go through the lock again.
        for _ in 0..2 {
            let cell = self
                .cells
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone();

            let mut outcome = PrebundleOutcome::Hit;
            let entry = cell
                .get_or_try_init(|| {
                    let (entry, rebuilt) = self.load_or_build(request, &fingerprint, force)?;
                    if rebuilt {
                        outcome = PrebundleOutcome::Rebuilt;
                    }
                    Ok::<_, PrebundleError>(Arc::new(entry))
                })?
                .clone();

            if entry.is_usable(request) {
                debug!(fingerprint = %fingerprint, ?outcome, deps = request.deps.len(), "pre-bundle ready");
                return Ok(Prebundled {
                    outcome,
                    entry: Some(entry),
                });
            }

            self.cells
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &cell));
        }

        Err(PrebundleError::Metadata {
            path: request.deps_dir().join(&fingerprint),
            message: "entry kept changing while it was being read".to_string(),
        })
    }

    fn load_or_build(
        &self,
        request: &PrebundleRequest,
        fingerprint: &str,
        force: bool,
    ) -> Result<(PrebundleEntry, bool), PrebundleError> {
        let deps_dir = request.deps_dir();
        let entry_dir = deps_dir.join(fingerprint);

        if !force {
            if let Some(entry) = reusable(&entry_dir, fingerprint, request) {
                return Ok((entry, false));
            }
        }

        fs::create_dir_all(&deps_dir).map_err(|source| PrebundleError::Io {
            action: "create",
            path: deps_dir.clone(),
            source,
        })?;
        let _lock = CacheLock::acquire(&deps_dir)?;

        // Another process may have finished the rebuild while we waited.
        if !force {
            if let Some(entry) = reusable(&entry_dir, fingerprint, request) {
                debug!(fingerprint, "pre-bundle entry built by another process");
                return Ok((entry, false));
            }
        }

        let mut deps = request.deps.clone();
        if let Some(previous) = manifest::load_valid(&entry_dir, fingerprint) {
            for (id, record) in previous.deps {
                let name = split_name(&id).to_string();
                deps.entry(id).or_insert(DepRequest {
                    name,
                    entry: record.entry,
                });
            }
        }

        info!(fingerprint, deps = deps.len(), "pre-bundling dependencies");
        let metadata = build_entry(&deps_dir, &entry_dir, fingerprint, &deps, &request.root)?;
        prune_siblings(&deps_dir, fingerprint);
        self.rebuilds.fetch_add(1, Ordering::SeqCst);

        Ok((
            PrebundleEntry {
                fingerprint: fingerprint.to_string(),
                dir: entry_dir,
                metadata,
            },
            true,
        ))
    }
}

fn reusable(entry_dir: &Path, fingerprint: &str, request: &PrebundleRequest) -> Option<PrebundleEntry> {
    let metadata = manifest::load_valid(entry_dir, fingerprint)?;
    if !metadata.covers(request.deps.keys()) {
        debug!(fingerprint, "pre-bundle entry lacks newly discovered dependencies");
        return None;
    }
    Some(PrebundleEntry {
        fingerprint: fingerprint.to_string(),
        dir: entry_dir.to_path_buf(),
        metadata,
    })
}

/// Write artifacts into a staging directory, then move it into place.
/// `_metadata.json` is written last so a torn entry never looks valid.
fn build_entry(
    deps_dir: &Path,
    entry_dir: &Path,
    fingerprint: &str,
    deps: &BTreeMap<String, DepRequest>,
    root: &Path,
) -> Result<PrebundleMetadata, PrebundleError> {
    let staging = deps_dir.join(format!(".{fingerprint}.staging-{}", std::process::id()));
    if staging.exists() {
        remove_dir(&staging)?;
    }
    fs::create_dir_all(&staging).map_err(|source| PrebundleError::Io {
        action: "create",
        path: staging.clone(),
        source,
    })?;

    let result: Result<PrebundleMetadata, PrebundleError> = (|| {
        let mut metadata = PrebundleMetadata::new(fingerprint);
        for (id, dep) in deps {
            let code = flatten_package(id, &dep.name, &dep.entry)?;
            let file = flatten_name(id);
            let path = staging.join(&file);
            fs::write(&path, code).map_err(|source| PrebundleError::Io {
                action: "write",
                path,
                source,
            })?;
            metadata.deps.insert(
                id.clone(),
                DepRecord {
                    file,
                    version: fingerprint::installed_version(root, &dep.name),
                    entry: dep.entry.clone(),
                },
            );
        }
        metadata.write(&staging)?;

        if entry_dir.exists() {
            remove_dir(entry_dir)?;
        }
        fs::rename(&staging, entry_dir).map_err(|source| PrebundleError::Io {
            action: "rename",
            path: staging.clone(),
            source,
        })?;
        Ok(metadata)
    })();

    if result.is_err() {
        let _ = fs::remove_dir_all(&staging);
    }
    result
}

/// Remove entries for other fingerprints. Failures only cost disk space.
fn prune_siblings(deps_dir: &Path, keep: &str) {
    let Ok(read) = fs::read_dir(deps_dir) else {
        return;
    };
    for item in read.flatten() {
        let name = item.file_name();
        let name = name.to_string_lossy();
        if name == keep || name.starts_with('.') || !item.path().is_dir() {
            continue;
        }
        match fs::remove_dir_all(item.path()) {
            Ok(()) => debug!(entry = %name, "pruned stale pre-bundle entry"),
            Err(err) => debug!(entry = %name, %err, "could not prune pre-bundle entry"),
        }
    }
}

fn remove_dir(path: &Path) -> Result<(), PrebundleError> {
    fs::remove_dir_all(path).map_err(|source| PrebundleError::Io {
        action: "remove",
        path: path.to_path_buf(),
        source,
    })
}

fn split_name(id: &str) -> &str {
    crate::resolve::package::split_bare_specifier(id).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "package.json", r#"{ "dependencies": { "showdown": "^2.1.0", "feather-icons": "^4.29.0" } }"#);
        write(root, "node_modules/showdown/package.json", r#"{ "version": "2.1.0", "main": "dist/showdown.js" }"#);
        write(root, "node_modules/showdown/dist/showdown.js", "export default function showdown() {}\n");
        write(root, "node_modules/feather-icons/package.json", r#"{ "version": "4.29.0" }"#);
        write(root, "node_modules/feather-icons/index.js", "export const icons = {};\n");
        dir
    }

    fn request(root: &Path, ids: &[&str]) -> PrebundleRequest {
        let entries = [
            ("showdown", "node_modules/showdown/dist/showdown.js"),
            ("feather-icons", "node_modules/feather-icons/index.js"),
        ];
        let deps = ids
            .iter()
            .map(|id| {
                let rel = entries.iter().find(|(name, _)| name == id).unwrap().1;
                (
                    id.to_string(),
                    DepRequest {
                        name: id.to_string(),
                        entry: root.join(rel),
                    },
                )
            })
            .collect();
        PrebundleRequest {
            root: root.to_path_buf(),
            cache_dir: root.join("node_modules/.kiln"),
            deps,
            options: OptimizeDepsOptions::default(),
        }
    }

    #[test]
    fn empty_request_is_skipped() {
        let dir = project();
        let cache = PrebundleCache::new();
        let result = cache.prebundle(&request(dir.path(), &[])).unwrap();
        assert_eq!(result.outcome, PrebundleOutcome::Skipped);
        assert!(result.entry.is_none());
    }

    #[test]
    fn second_request_hits() {
        let dir = project();
        let req = request(dir.path(), &["showdown"]);

        let first = PrebundleCache::new().prebundle(&req).unwrap();
        assert_eq!(first.outcome, PrebundleOutcome::Rebuilt);
        let entry = first.entry.unwrap();
        assert!(entry.read_artifact("showdown").unwrap().contains("function showdown"));
        assert_eq!(entry.metadata.deps["showdown"].version.as_deref(), Some("2.1.0"));

        // A fresh cache object (another process) reuses the on-disk entry.
        let other = PrebundleCache::new();
        let second = other.prebundle(&req).unwrap();
        assert_eq!(second.outcome, PrebundleOutcome::Hit);
        assert_eq!(other.rebuild_count(), 0);
    }

    #[test]
    fn concurrent_requesters_share_one_rebuild() {
        let dir = project();
        let req = request(dir.path(), &["showdown", "feather-icons"]);
        let cache = Arc::new(PrebundleCache::new());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                let req = req.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    cache.prebundle(&req).unwrap().outcome
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(cache.rebuild_count(), 1);
        assert_eq!(
            outcomes.iter().filter(|o| **o == PrebundleOutcome::Rebuilt).count(),
            1
        );
    }

    #[test]
    fn fingerprint_change_rebuilds_and_prunes() {
        let dir = project();
        let req = request(dir.path(), &["showdown"]);
        let cache = PrebundleCache::new();
        let first = cache.prebundle(&req).unwrap().entry.unwrap();

        write(dir.path(), "node_modules/showdown/package.json", r#"{ "version": "2.1.1", "main": "dist/showdown.js" }"#);
        let second = cache.prebundle(&req).unwrap();
        assert_eq!(second.outcome, PrebundleOutcome::Rebuilt);
        let second = second.entry.unwrap();
        assert_ne!(first.fingerprint, second.fingerprint);
        assert!(!first.dir.exists());
        assert!(second.dir.exists());
        assert_eq!(cache.rebuild_count(), 2);
    }

    #[test]
    fn deleted_artifact_heals() {
        let dir = project();
        let req = request(dir.path(), &["showdown"]);
        let cache = PrebundleCache::new();
        let entry = cache.prebundle(&req).unwrap().entry.unwrap();
        fs::remove_file(entry.artifact_path("showdown").unwrap()).unwrap();

        let again = cache.prebundle(&req).unwrap();
        assert_eq!(again.outcome, PrebundleOutcome::Rebuilt);
        assert!(again.entry.unwrap().artifact_path("showdown").unwrap().is_file());
    }

    #[test]
    fn newly_discovered_dependency_extends_the_entry() {
        let dir = project();
        let cache = PrebundleCache::new();
        cache.prebundle(&request(dir.path(), &["showdown"])).unwrap();

        let wider = cache
            .prebundle(&request(dir.path(), &["feather-icons"]))
            .unwrap()
            .entry
            .unwrap();
        assert!(wider.metadata.deps.contains_key("showdown"));
        assert!(wider.metadata.deps.contains_key("feather-icons"));
    }

    #[test]
    fn force_rebuilds_a_valid_entry() {
        let dir = project();
        let mut req = request(dir.path(), &["showdown"]);
        let cache = PrebundleCache::new();
        cache.prebundle(&req).unwrap();
        req.options.force = true;
        assert_eq!(cache.prebundle(&req).unwrap().outcome, PrebundleOutcome::Rebuilt);
    }
}
