//! # Directory Lock
//!
//! Exclusive advisory lock on a chain directory, taken with `fs2` (flock on
//! Unix, LockFile on Windows). One [`ChainStore`](super::chain::ChainStore)
//! holds it for its whole lifetime so that a second writer, in this process
//! or another, cannot race it on `.chain-meta`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::config::LOCK_FILE;

/// RAII guard: the lock is released when this is dropped.
#[derive(Debug)]
pub struct DirLock {
    file: File,
    path: PathBuf,
}

/// Why a lock could not be taken.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another handle already holds the lock.
    #[error("lock already held: {}", .0.display())]
    Held(PathBuf),
    /// The lock file could not be created, locked or written.
    #[error("lock file i/o error: {0}")]
    Io(#[source] io::Error),
}

impl DirLock {
    /// Try once to lock `dir`. Never blocks.
    pub fn acquire(dir: &Path) -> Result<Self, LockError> {
        let path = dir.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(LockError::Io)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == fs2::lock_contended_error().kind() {
                return Err(LockError::Held(path));
            }
            return Err(LockError::Io(e));
        }

        // Informational only; the flock is what matters.
        file.set_len(0).map_err(LockError::Io)?;
        writeln!(file, "{}", std::process::id()).map_err(LockError::Io)?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
