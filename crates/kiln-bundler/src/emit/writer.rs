//! Committing rendered targets to disk.
//!
//! Writing is split in two steps so that no target is touched until every
//! target has been staged:
//!
//! 1. [`stage`] writes all files of a target into a sibling staging
//!    directory. Nothing inside the output directory changes.
//! 2. [`StagedTarget::commit`] moves the staged files into place.
//!    - A clearing target swaps directories: the old tree is moved aside,
//!      the staging tree renamed in, and the old tree removed. The old tree
//!      is moved back if the swap fails.
//!    - An additive target merges file by file. Every file about to be
//!      overwritten is first moved into a sibling backup directory. If any
//!      step fails, the new files are removed, the backups moved back and
//!      the directories the merge created removed again.
//!
//! Dropping a staged target without committing removes what was staged.

use std::fs;
use std::path::{Path, PathBuf};

use path_clean::PathClean;
use tracing::{debug, warn};

use super::RenderedFile;
use crate::{Error, Result};

/// Files of one target written to disk but not yet visible.
#[derive(Debug)]
pub struct StagedTarget {
    name: String,
    out_dir: PathBuf,
    staging: PathBuf,
    mode: CommitMode,
    committed: bool,
}

#[derive(Debug)]
enum CommitMode {
    /// The staging tree replaces `out_dir`
    Swap,
    /// Staged files, relative to the staging tree, are merged into `out_dir`
    Merge { files: Vec<PathBuf> },
}

/// Stage `files` for `out_dir`.
pub fn stage(name: &str, out_dir: &Path, clear: bool, files: &[RenderedFile]) -> Result<StagedTarget> {
    let out_dir = validate_and_normalize_dir(out_dir)?;
    let staging = sibling(&out_dir, "staging")?;
    if staging.exists() {
        fs::remove_dir_all(&staging).map_err(|e| Error::io("remove", &staging, e))?;
    }

    let mut operations = Vec::with_capacity(files.len());
    let mut relative = Vec::with_capacity(files.len());
    for file in files {
        // Validated against both trees so the merge can't escape `out_dir`.
        validate_output_path(&out_dir, &file.path)?;
        let staged = validate_output_path(&staging, &file.path)?;
        relative.push(staged.strip_prefix(&staging).unwrap_or(staged.as_path()).to_path_buf());
        operations.push((staged, file.contents.as_bytes()));
    }
    if let Err(err) = write_files(&operations) {
        let _ = fs::remove_dir_all(&staging);
        return Err(err);
    }
    // An empty target still needs its directory.
    fs::create_dir_all(&staging).map_err(|e| Error::io("create", &staging, e))?;

    let mode = if clear {
        CommitMode::Swap
    } else {
        CommitMode::Merge { files: relative }
    };

    debug!(target = name, dir = %out_dir.display(), "target staged");
    Ok(StagedTarget {
        name: name.to_string(),
        out_dir,
        staging,
        mode,
        committed: false,
    })
}

impl StagedTarget {
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Make the staged files visible.
    ///
    /// On error the output directory is left as it was before the call.
    pub fn commit(mut self) -> Result<()> {
        match &self.mode {
            CommitMode::Swap => swap_in(&self.staging, &self.out_dir)?,
            CommitMode::Merge { files } => {
                merge_in(&self.staging, &self.out_dir, files)?;
                remove_tree(&self.staging);
            }
        }
        self.committed = true;
        debug!(target = %self.name, dir = %self.out_dir.display(), "target committed");
        Ok(())
    }
}

impl Drop for StagedTarget {
    fn drop(&mut self) {
        if !self.committed {
            remove_tree(&self.staging);
        }
    }
}

fn swap_in(staging: &Path, out_dir: &Path) -> Result<()> {
    let previous = if out_dir.exists() {
        let aside = sibling(out_dir, "old")?;
        if aside.exists() {
            fs::remove_dir_all(&aside).map_err(|e| Error::io("remove", &aside, e))?;
        }
        fs::rename(out_dir, &aside).map_err(|e| {
            Error::WriteFailure(format!(
                "Failed to move '{}' aside: {}",
                out_dir.display(),
                e
            ))
        })?;
        Some(aside)
    } else {
        None
    };

    if let Err(e) = fs::rename(staging, out_dir) {
        if let Some(aside) = &previous {
            if let Err(restore) = fs::rename(aside, out_dir) {
                warn!(dir = %out_dir.display(), error = %restore, "failed to restore previous output");
            }
        }
        return Err(Error::WriteFailure(format!(
            "Failed to rename '{}' to '{}': {}",
            staging.display(),
            out_dir.display(),
            e
        )));
    }

    if let Some(aside) = previous {
        remove_tree(&aside);
    }
    Ok(())
}

/// Everything a merge changed, so it can be undone.
#[derive(Debug, Default)]
struct MergeJournal {
    created_dirs: Vec<PathBuf>,
    /// `(final, backup)` for files moved out of the way
    backed_up: Vec<(PathBuf, PathBuf)>,
    placed: Vec<PathBuf>,
}

impl MergeJournal {
    /// Undo in reverse order. Returns false if anything could not be restored.
    fn roll_back(self) -> bool {
        let mut clean = true;
        for path in self.placed.iter().rev() {
            if let Err(e) = fs::remove_file(path) {
                warn!(file = %path.display(), error = %e, "failed to remove merged file");
                clean = false;
            }
        }
        for (dest, backup) in self.backed_up.iter().rev() {
            if let Err(e) = fs::rename(backup, dest) {
                warn!(file = %dest.display(), backup = %backup.display(), error = %e, "failed to restore overwritten file");
                clean = false;
            }
        }
        for dir in self.created_dirs.iter().rev() {
            if let Err(e) = fs::remove_dir(dir) {
                warn!(dir = %dir.display(), error = %e, "failed to remove created directory");
            }
        }
        clean
    }
}

fn merge_in(staging: &Path, out_dir: &Path, files: &[PathBuf]) -> Result<()> {
    let backup_root = sibling(out_dir, "backup")?;
    if backup_root.exists() {
        fs::remove_dir_all(&backup_root).map_err(|e| Error::io("remove", &backup_root, e))?;
    }

    let mut journal = MergeJournal::default();
    let result = files
        .iter()
        .try_for_each(|rel| merge_file(staging, out_dir, &backup_root, rel, &mut journal));

    match result {
        Ok(()) => {
            remove_tree(&backup_root);
            Ok(())
        }
        Err(err) => {
            if journal.roll_back() {
                remove_tree(&backup_root);
            } else {
                warn!(dir = %backup_root.display(), "kept backups of files that could not be restored");
            }
            Err(err)
        }
    }
}

fn merge_file(
    staging: &Path,
    out_dir: &Path,
    backup_root: &Path,
    rel: &Path,
    journal: &mut MergeJournal,
) -> Result<()> {
    let source = staging.join(rel);
    let dest = out_dir.join(rel);

    if let Some(parent) = dest.parent() {
        create_dirs(parent, &mut journal.created_dirs)?;
    }

    match fs::symlink_metadata(&dest) {
        Ok(meta) if meta.is_dir() => {
            return Err(Error::WriteFailure(format!(
                "Cannot replace directory '{}' with a file",
                dest.display()
            )));
        }
        Ok(_) => {
            let backup = backup_root.join(rel);
            if let Some(parent) = backup.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io("create", parent, e))?;
            }
            fs::rename(&dest, &backup).map_err(|e| {
                Error::WriteFailure(format!("Failed to back up '{}': {}", dest.display(), e))
            })?;
            journal.backed_up.push((dest.clone(), backup));
        }
        Err(_) => {}
    }

    fs::rename(&source, &dest).map_err(|e| {
        Error::WriteFailure(format!(
            "Failed to rename '{}' to '{}': {}",
            source.display(),
            dest.display(),
            e
        ))
    })?;
    journal.placed.push(dest);
    Ok(())
}

/// `create_dir_all`, remembering which directories did not exist yet.
fn create_dirs(dir: &Path, created: &mut Vec<PathBuf>) -> Result<()> {
    let missing: Vec<&Path> = dir.ancestors().take_while(|d| !d.exists()).collect();
    for d in missing.into_iter().rev() {
        fs::create_dir(d).map_err(|e| {
            Error::WriteFailure(format!("Failed to create directory '{}': {}", d.display(), e))
        })?;
        created.push(d.to_path_buf());
    }
    Ok(())
}

fn remove_tree(dir: &Path) {
    if dir.exists() {
        if let Err(e) = fs::remove_dir_all(dir) {
            warn!(dir = %dir.display(), error = %e, "failed to remove directory");
        }
    }
}

/// `<parent>/.<dir name>.<tag>-<pid>`
fn sibling(out_dir: &Path, tag: &str) -> Result<PathBuf> {
    let (Some(parent), Some(name)) = (out_dir.parent(), out_dir.file_name()) else {
        return Err(Error::InvalidOutputPath(format!(
            "'{}' has no parent directory",
            out_dir.display()
        )));
    };
    Ok(parent.join(format!(
        ".{}.{}-{}",
        name.to_string_lossy(),
        tag,
        std::process::id()
    )))
}

/// Normalize a directory path to an absolute, cleaned path.
fn validate_and_normalize_dir(dir: &Path) -> Result<PathBuf> {
    let cleaned = dir.clean();

    let absolute = if cleaned.is_absolute() {
        cleaned
    } else {
        std::env::current_dir()
            .map_err(|e| {
                Error::InvalidOutputPath(format!("Failed to get current directory: {}", e))
            })?
            .join(&cleaned)
            .clean()
    };

    Ok(absolute)
}

/// Join `filename` onto `base_dir`, refusing anything that escapes it.
pub(crate) fn validate_output_path(base_dir: &Path, filename: &str) -> Result<PathBuf> {
    if filename.contains('\0') {
        return Err(Error::InvalidOutputPath(
            "Filename contains null byte".to_string(),
        ));
    }

    #[cfg(target_os = "windows")]
    {
        let upper = filename.to_uppercase();
        let device_names = [
            "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
            "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
        ];
        for device in &device_names {
            if upper == *device || upper.starts_with(&format!("{}.", device)) {
                return Err(Error::InvalidOutputPath(format!(
                    "Filename is a reserved device name: {}",
                    filename
                )));
            }
        }
    }

    let full_path = base_dir.join(Path::new(filename).clean()).clean();

    if !full_path.starts_with(base_dir) || full_path == base_dir {
        return Err(Error::InvalidOutputPath(format!(
            "Path '{}' escapes output directory '{}' (resolved to '{}')",
            filename,
            base_dir.display(),
            full_path.display()
        )));
    }

    Ok(full_path)
}

/// Write every file, removing the ones already written if one fails.
fn write_files(operations: &[(PathBuf, &[u8])]) -> Result<()> {
    let mut written: Vec<&Path> = Vec::new();

    for (path, content) in operations {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                remove_files(&written);
                Error::WriteFailure(format!(
                    "Failed to create directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        fs::write(path, content).map_err(|e| {
            remove_files(&written);
            Error::WriteFailure(format!("Failed to write '{}': {}", path.display(), e))
        })?;
        written.push(path);
    }

    Ok(())
}

/// Best-effort removal; we are already failing.
fn remove_files(paths: &[&Path]) {
    for path in paths {
        if path.exists() {
            if let Err(e) = fs::remove_file(path) {
                warn!(file = %path.display(), error = %e, "failed to clean up temporary file");
            }
        }
    }
}
