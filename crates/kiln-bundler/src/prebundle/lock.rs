//! Cross-process lock on the pre-bundle cache directory.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use super::PrebundleError;

const LOCK_FILENAME: &str = ".lock";

/// Exclusive advisory lock, released when dropped.
///
/// Acquisition blocks, so a second process asking for the same cache waits
/// for the in-flight rebuild and then sees its result.
#[derive(Debug)]
pub struct CacheLock {
    _file: File,
    lock_path: PathBuf,
}

impl CacheLock {
    pub fn acquire(dir: &Path) -> Result<Self, PrebundleError> {
        let lock_path = dir.join(LOCK_FILENAME);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| PrebundleError::Lock {
                path: lock_path.clone(),
                source,
            })?;

        lock_exclusive(&file).map_err(|source| PrebundleError::Lock {
            path: lock_path.clone(),
            source,
        })?;
        tracing::trace!(lock = %lock_path.display(), "pre-bundle cache locked");

        Ok(Self {
            _file: file,
            lock_path,
        })
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> io::Result<()> {
    use rustix::fs::{FlockOperation, flock};
    use std::os::unix::io::AsFd;

    flock(file.as_fd(), FlockOperation::LockExclusive)
        .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

// Other platforms only get in-process coalescing.
#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> io::Result<()> {
    Ok(())
}
