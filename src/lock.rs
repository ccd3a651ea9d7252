//! Single-instance guard backed by an advisory file lock.
//!
//! Telegram long polling tolerates exactly one consumer per bot token; a
//! second process would silently steal updates from the first. The guard
//! takes an exclusive OS lock on a marker file and holds it for the
//! process lifetime. The kernel drops the lock when the process dies, so
//! a crash never leaves a stale lock behind.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs4::FileExt;
use tracing::{debug, warn};

/// Failures while taking the instance lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another live process already holds the lock file.
    #[error("another instance already holds {0}")]
    AlreadyRunning(PathBuf),
    /// The lock file could not be created or locked.
    #[error("lock file error: {0}")]
    Io(#[from] io::Error),
}

/// Holds the exclusive lock until dropped.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Takes the exclusive lock at `path`, creating the file if needed.
    ///
    /// # Errors
    ///
    /// [`LockError::AlreadyRunning`] when another process holds the lock,
    /// [`LockError::Io`] for any other filesystem failure.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // No truncate on open: the file may belong to a live instance
        // whose lock we are about to test.
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                return Err(LockError::AlreadyRunning(path));
            }
            Err(err) => return Err(LockError::Io(err)),
        }
        // The pid is informational for operators; the OS lock is what
        // keeps other instances out.
        let _ = file.set_len(0);
        if let Err(err) = writeln!(file, "{}", std::process::id()) {
            debug!("Could not write pid to lock file: {err}");
        }
        Ok(Self { file, path })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            warn!("Could not release instance lock: {err}");
        }
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_reacquire_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.lock");
        let lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(lock.path(), path);
        drop(lock);
        let again = InstanceLock::acquire(&path).unwrap();
        drop(again);
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.lock");
        let _held = InstanceLock::acquire(&path).unwrap();
        match InstanceLock::acquire(&path) {
            Err(LockError::AlreadyRunning(p)) => assert_eq!(p, path),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
    }

    #[test]
    fn test_lock_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.lock");
        let lock = InstanceLock::acquire(&path).unwrap();
        assert!(path.exists());
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_parent_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bot.lock");
        let lock = InstanceLock::acquire(&path).unwrap();
        assert!(path.exists());
        drop(lock);
    }
}
