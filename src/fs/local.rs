//! Local disk implementation of [`FileSystem`].

use crate::fs::{lister, resolve_virtual, FileSystem};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Serves virtual paths from a directory on the local disk.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
    home: String,
}

impl LocalFs {
    /// Maps virtual `/` to `root`. `home` is the virtual path `~` expands to.
    pub fn new(root: impl Into<PathBuf>, home: &str) -> Self {
        Self {
            root: root.into(),
            home: resolve_virtual("/", home, "/"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn home(&self) -> &str {
        &self.home
    }

    /// Maps a resolved virtual path onto the disk.
    pub fn real_path(&self, path: &str) -> PathBuf {
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }
}

impl FileSystem for LocalFs {
    fn resolve(&self, cwd: &str, requested: &str) -> String {
        resolve_virtual(cwd, requested, &self.home)
    }

    fn list(&self, path: &str) -> io::Result<String> {
        lister::list_directory(&self.real_path(path), path)
    }

    fn mkdir(&self, path: &str) -> io::Result<bool> {
        let real = self.real_path(path);
        if real.exists() {
            return Ok(false);
        }
        fs::create_dir_all(&real)?;
        debug!(path, "Directory created");
        Ok(true)
    }

    fn rmdir(&self, path: &str) -> io::Result<bool> {
        let real = self.real_path(path);
        if !real.is_dir() {
            return Ok(false);
        }
        fs::remove_dir_all(&real)?;
        debug!(path, "Directory removed");
        Ok(true)
    }

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.real_path(path))
    }

    fn write_file(&self, path: &str, data: &[u8]) -> io::Result<()> {
        fs::write(self.real_path(path), data)
    }

    fn is_dir(&self, path: &str) -> bool {
        self.real_path(path).is_dir()
    }
}
