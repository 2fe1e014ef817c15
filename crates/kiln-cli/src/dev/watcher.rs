//! File system watcher for watch mode.
//!
//! Watches the project root (plus any extra `dev.watch_paths`) and forwards
//! relevant changes over a channel. Build outputs and the dependency cache are
//! ignored so emitting never retriggers a rebuild.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{CliError, Result};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Modified(PathBuf),
    Created(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }

    fn from_event(kind: &EventKind, path: PathBuf) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(FileChange::Created(path)),
            EventKind::Modify(_) => Some(FileChange::Modified(path)),
            EventKind::Remove(_) => Some(FileChange::Removed(path)),
            _ => None,
        }
    }
}

/// Recursive watcher over one or more roots.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    roots: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
struct IgnoreRules {
    roots: Vec<PathBuf>,
    patterns: Vec<String>,
    /// Absolute directories (target outputs, cache) skipped wholesale
    dirs: Vec<PathBuf>,
}

impl FileWatcher {
    /// Start watching `roots` recursively.
    ///
    /// `patterns` follow `dev.ignore`: `*.ext` matches a suffix, anything else
    /// matches a leading path component sequence. Paths under `ignored_dirs`
    /// are always skipped.
    pub fn new(
        roots: Vec<PathBuf>,
        patterns: Vec<String>,
        ignored_dirs: Vec<PathBuf>,
    ) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        if let Some(missing) = roots.iter().find(|root| !root.exists()) {
            return Err(CliError::FileNotFound(missing.clone()));
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let rules = IgnoreRules {
            roots: roots.clone(),
            patterns,
            dirs: ignored_dirs,
        };

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(error = %err, "watch error");
                    return;
                }
            };
            for path in event.paths {
                if rules.should_ignore(&path) {
                    continue;
                }
                let Some(change) = FileChange::from_event(&event.kind, path) else {
                    continue;
                };
                // The receiver is gone once watch mode shuts down.
                if tx.blocking_send(change).is_err() {
                    return;
                }
            }
        })?;

        for root in &roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
        }

        Ok((
            Self {
                _watcher: watcher,
                roots,
            },
            rx,
        ))
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl IgnoreRules {
    fn should_ignore(&self, path: &Path) -> bool {
        if self.dirs.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }

        let Some(rel) = self
            .roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
        else {
            return true;
        };

        let rel_str = rel.to_string_lossy().replace('\\', "/");
        for pattern in &self.patterns {
            if let Some(suffix) = pattern.strip_prefix('*') {
                if rel_str.ends_with(suffix) {
                    return true;
                }
            } else if rel_str == *pattern
                || rel_str.starts_with(&format!("{pattern}/"))
                || rel_str.contains(&format!("/{pattern}/"))
            {
                return true;
            }
        }

        rel.components().any(|component| {
            component
                .as_os_str()
                .to_str()
                .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
        })
    }
}

/// Wait for the next change, then keep collecting until `quiet` passes with
/// no further events. Returns `None` once the watcher is gone.
///
/// Paths are de-duplicated; the latest change for a path wins.
pub async fn next_batch(
    rx: &mut mpsc::Receiver<FileChange>,
    quiet: Duration,
) -> Option<Vec<FileChange>> {
    let first = rx.recv().await?;
    let mut batch = BTreeMap::new();
    batch.insert(first.path().to_path_buf(), first);

    loop {
        match tokio::time::timeout(quiet, rx.recv()).await {
            Ok(Some(change)) => {
                batch.insert(change.path().to_path_buf(), change);
            }
            Ok(None) | Err(_) => break,
        }
    }

    Some(batch.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(patterns: &[&str]) -> IgnoreRules {
        IgnoreRules {
            roots: vec![PathBuf::from("/project"), PathBuf::from("/shared/ui")],
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            dirs: vec![
                PathBuf::from("/project/public/app"),
                PathBuf::from("/project/node_modules/.kiln"),
            ],
        }
    }

    #[test]
    fn ignores_configured_directories() {
        let rules = rules(&["node_modules"]);
        assert!(rules.should_ignore(Path::new("/project/node_modules/showdown/index.js")));
        assert!(rules.should_ignore(Path::new("/project/packages/a/node_modules/x.js")));
        assert!(!rules.should_ignore(Path::new("/project/src/node_modules_helper.ts")));
        assert!(!rules.should_ignore(Path::new("/project/src/main.ts")));
    }

    #[test]
    fn ignores_extensions_and_hidden_paths() {
        let rules = rules(&["*.log"]);
        assert!(rules.should_ignore(Path::new("/project/debug.log")));
        assert!(rules.should_ignore(Path::new("/project/.git/HEAD")));
        assert!(rules.should_ignore(Path::new("/project/src/.cache/a.js")));
        assert!(!rules.should_ignore(Path::new("/project/package-lock.json")));
    }

    #[test]
    fn ignores_outputs_and_foreign_paths() {
        let rules = rules(&[]);
        assert!(rules.should_ignore(Path::new("/project/public/app/assets/main.js")));
        assert!(rules.should_ignore(Path::new("/elsewhere/file.ts")));
        assert!(!rules.should_ignore(Path::new("/shared/ui/button.vue")));
    }

    #[tokio::test]
    async fn batches_until_quiet() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(FileChange::Created("/p/a.ts".into())).await.unwrap();
        tx.send(FileChange::Modified("/p/b.ts".into())).await.unwrap();
        tx.send(FileChange::Modified("/p/a.ts".into())).await.unwrap();

        let batch = next_batch(&mut rx, Duration::from_millis(20)).await.unwrap();
        assert_eq!(
            batch,
            vec![
                FileChange::Modified("/p/a.ts".into()),
                FileChange::Modified("/p/b.ts".into()),
            ]
        );

        drop(tx);
        assert!(next_batch(&mut rx, Duration::from_millis(20)).await.is_none());
    }
}
