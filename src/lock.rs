//! File-based locking to prevent concurrent runs against one interface.
//!
//! Uses flock-style advisory locking on `<lock_dir>/gigelink-<iface>.lock`.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::SetupError;

/// Lock file path for `iface` under `lock_dir`.
pub fn lock_path(lock_dir: &Path, iface: &str) -> PathBuf {
    lock_dir.join(format!("gigelink-{}.lock", iface))
}

/// Holds an exclusive lock for one interface.
/// The lock is automatically released when the guard is dropped.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Attempt to acquire the lock without blocking.
    ///
    /// Opens with create+read+write (no truncate) so creation and locking
    /// operate on the same file.
    pub fn acquire(lock_dir: &Path, iface: &str) -> Result<Self, SetupError> {
        let path = lock_path(lock_dir, iface);
        if !lock_dir.exists() {
            fs::create_dir_all(lock_dir).map_err(|e| {
                SetupError::Lock(format!("cannot create {}: {}", lock_dir.display(), e))
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| SetupError::Lock(format!("cannot open {}: {}", path.display(), e)))?;

        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .map_err(|e| SetupError::Lock(format!("cannot chmod {}: {}", path.display(), e)))?;

        file.try_lock_exclusive().map_err(|_| {
            SetupError::Lock(format!(
                "another gigelink run is already configuring {}. \
                 If you believe this is an error, remove the lock file: {}",
                iface,
                path.display()
            ))
        })?;

        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
