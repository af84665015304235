//! Filesystem access behind a trait.
//!
//! Covers the handful of operations gigelink needs: reading sysfs and config
//! fragments, listing `/sys/class/net`, and atomic replacement of files
//! under `/etc`.

use std::io;
use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;

/// Interface enumeration reads `/sys/class/net` through this trait and the
/// persistence writer edits `/etc` through it, so both can be exercised
/// against a temp directory or a mock.
///
/// # Example (testing)
/// ```ignore
/// use gigelink::fs_abstraction::MockFileSystem;
/// use std::path::Path;
///
/// let mut mock_fs = MockFileSystem::new();
/// mock_fs.expect_list_dir()
///     .returning(|_| Ok(vec!["lo".to_string(), "eth0".to_string()]));
/// ```
#[cfg_attr(test, automock)]
pub trait FileSystem: Send + Sync {
    /// Read file contents as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Write bytes to a file, creating it if it doesn't exist.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Check if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Create a directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Rename a file, replacing the destination.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// List the entry names of a directory.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>>;
}

#[derive(Default, Clone, Copy)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(path)? {
            names.push(entry?.file_name().to_string_lossy().to_string());
        }
        Ok(names)
    }
}

static REAL_FS: RealFileSystem = RealFileSystem;

/// The host filesystem.
pub fn real_fs() -> &'static RealFileSystem {
    &REAL_FS
}

/// Write `contents` to `path` through a sibling temp file and a rename, so a
/// crash never leaves a half-written config fragment behind.
pub fn write_atomic(fs: &dyn FileSystem, path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !fs.exists(parent) {
            fs.create_dir_all(parent)?;
        }
    }
    let tmp = temp_path(path);
    fs.write(&tmp, contents.as_bytes())?;
    fs.rename(&tmp, path)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".gigelink.tmp");
    path.with_file_name(name)
}
