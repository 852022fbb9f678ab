//! Family Tree lock file.
//!
//! A writable open creates `<tree>/lock` exclusively and holds an advisory
//! lock on it for the lifetime of the [`TreeLock`]. The file records who
//! holds the tree so that another process can report it.

use crate::error::{FamError, Result, StorageOpenReason};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the lock file inside a tree directory.
pub const LOCK_FILE: &str = "lock";

/// RAII guard for a tree lock.
///
/// Dropping the guard releases the advisory lock and removes the lock file.
#[derive(Debug)]
pub struct TreeLock {
    file: Option<File>,
    path: PathBuf,
}

impl TreeLock {
    /// Takes the lock on `tree_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageOpenReason::Locked`] if another holder has the lock.
    pub fn acquire(tree_dir: &Path) -> Result<Self> {
        let path = tree_dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                write!(file, "{}", lock_holder_text())?;
                file.flush()?;
                if file.try_lock_exclusive().is_err() {
                    let _ = fs::remove_file(&path);
                    return Err(locked_error(tree_dir));
                }
                debug!(path = %path.display(), "tree lock taken");
                Ok(Self {
                    file: Some(file),
                    path,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(locked_error(tree_dir)),
            Err(e) => Err(FamError::Io(e)),
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TreeLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
            drop(file);
        }
        let _ = fs::remove_file(&self.path);
    }
}

fn locked_error(tree_dir: &Path) -> FamError {
    FamError::StorageOpen {
        path: tree_dir.to_path_buf(),
        reason: StorageOpenReason::Locked {
            holder: locker_name(tree_dir),
        },
    }
}

/// `user@host` for the current process.
pub fn lock_holder_text() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = std::env::var("HOSTNAME")
        .ok()
        .or_else(|| fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    format!("{}@{}", user, host)
}

/// True if `tree_dir` carries a lock file.
pub fn is_locked(tree_dir: &Path) -> bool {
    tree_dir.join(LOCK_FILE).exists()
}

/// Who holds the lock, or "Unknown" when the file cannot be read.
pub fn locker_name(tree_dir: &Path) -> String {
    match fs::read_to_string(tree_dir.join(LOCK_FILE)) {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => "Unknown".to_string(),
    }
}

/// Removes a lock left by another process.
pub fn break_lock(tree_dir: &Path) -> Result<()> {
    let path = tree_dir.join(LOCK_FILE);
    match fs::remove_file(&path) {
        Ok(()) => {
            warn!(path = %path.display(), "broke tree lock");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FamError::Io(e)),
    }
}
