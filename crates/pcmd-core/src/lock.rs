//! Exclusive per-identity lock files
//!
//! Locks are advisory `flock(2)` locks on a file under the working
//! directory. The file is unlinked while the lock is still held, so a
//! contender that opened the old file notices (its inode no longer
//! matches the path) and starts over on a fresh file.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{LockError, PcmdError};
use crate::types::SessionPaths;

/// Result of a non-blocking lock attempt
#[derive(Debug)]
pub enum LockOutcome {
    /// This process now holds the lock
    Acquired(LockGuard),
    /// Another process holds the lock
    Contended,
}

impl LockOutcome {
    /// Whether the lock was acquired
    pub fn is_acquired(&self) -> bool {
        matches!(self, LockOutcome::Acquired(_))
    }
}

/// Try once to take the exclusive lock at `path` without blocking.
///
/// The parent directory must already exist.
pub fn acquire_or_report(path: &Path) -> Result<LockOutcome, LockError> {
    loop {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o640)
            .open(path)
            .map_err(|source| LockError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        if !try_flock(&file, path)? {
            tracing::debug!("Lock {:?} is held by another process", path);
            return Ok(LockOutcome::Contended);
        }

        if !still_linked(&file, path)? {
            // The previous holder unlinked this file before we got the lock.
            tracing::debug!("Lock file {:?} was replaced, retrying", path);
            continue;
        }

        tracing::debug!("Acquired lock {:?}", path);
        return Ok(LockOutcome::Acquired(LockGuard {
            path: path.to_path_buf(),
            file: Some(file),
        }));
    }
}

/// Prepare the session's files directory and try to take its lock.
pub fn lock_session(paths: &SessionPaths) -> Result<LockOutcome, PcmdError> {
    paths.ensure_files_dir()?;
    Ok(acquire_or_report(&paths.lock)?)
}

fn try_flock(file: &File, path: &Path) -> Result<bool, LockError> {
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(true),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_contended(&e) => return Ok(false),
            Err(source) => {
                return Err(LockError::Flock {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn still_linked(file: &File, path: &Path) -> Result<bool, LockError> {
    let held = file.metadata().map_err(|source| LockError::Inspect {
        path: path.to_path_buf(),
        source,
    })?;

    match fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(LockError::Inspect {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Holds an acquired lock until released or dropped.
///
/// Releasing removes the lock file first and only then closes the
/// descriptor, which drops the `flock`.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    file: Option<File>,
}

impl LockGuard {
    /// Path of the held lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock, reporting a failed removal
    pub fn release(mut self) -> Result<(), LockError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), LockError> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };

        let removed = match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Remove {
                path: self.path.clone(),
                source,
            }),
        };

        drop(file);
        tracing::debug!("Released lock {:?}", self.path);
        removed
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            tracing::warn!("{}", e);
        }
    }
}
