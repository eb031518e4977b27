//! Advisory lock serializing mutating commands on one installation root.
//!
//! The registry itself does no locking. Front-ends that may run concurrently
//! take a [`RootLock`] on `<root>/.cdereg.lock` for the duration of any
//! command that changes the registry or the installation tree. The lock is
//! released when the value drops.

use crate::error::{CdeError, Result};
use crate::platform::InstallRoot;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Exclusive `flock`-style lock on an installation root.
#[derive(Debug)]
pub struct RootLock {
    // Held open to keep the lock
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl RootLock {
    /// Take the lock without blocking.
    ///
    /// Fails with [`CdeError::LockHeld`] if another instance holds it.
    pub fn try_acquire(root: &InstallRoot) -> Result<Self> {
        let path = root.lock_file();
        let file = open_lock_file(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                info!("Acquired root lock at {}", path.display());
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || is_contended(&e) => {
                debug!("Root lock already held at {}", path.display());
                Err(CdeError::LockHeld { path })
            }
            Err(e) => Err(CdeError::io_with_path(e, path)),
        }
    }

    /// Whether any process currently holds the lock.
    pub fn is_held(root: &InstallRoot) -> bool {
        let path = root.lock_file();
        let Ok(file) = File::open(&path) else {
            return false;
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = file.unlock();
                false
            }
            Err(_) => true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        debug!("Released root lock at {}", self.path.display());
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CdeError::io_with_path(e, parent))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| CdeError::io_with_path(e, path))
}

fn is_contended(err: &std::io::Error) -> bool {
    err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_try_acquire_and_release() {
        let temp_dir = TempDir::new().unwrap();
        let root = InstallRoot::new(temp_dir.path());

        let lock = RootLock::try_acquire(&root).unwrap();
        assert!(lock.path().exists());
        assert!(RootLock::is_held(&root));

        drop(lock);
        assert!(!RootLock::is_held(&root));
    }

    #[test]
    fn test_second_instance_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let root = InstallRoot::new(temp_dir.path());

        let _lock = RootLock::try_acquire(&root).unwrap();
        let second = RootLock::try_acquire(&root);
        assert!(matches!(second, Err(CdeError::LockHeld { .. })));
    }

    #[test]
    fn test_missing_lock_file_is_not_held() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!RootLock::is_held(&InstallRoot::new(temp_dir.path())));
    }
}
