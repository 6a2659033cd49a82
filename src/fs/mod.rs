//! Filesystem access for the file commands.
//!
//! Commands never see real paths. Each session works with virtual absolute
//! paths (`/a/b`) which a [`FileSystem`] maps onto storage. The mapping used
//! by the server, [`LocalFs`], places the virtual root at a configured
//! directory on disk.
//!
//! ## Path Resolution
//!
//! Resolution is purely lexical and shared by every implementation:
//!
//! - relative paths are joined to the session's working directory,
//! - `~` and `~/...` start from the configured start directory,
//! - `.` components are dropped,
//! - `..` pops one component and stops at the root.
//!
//! The result is always an absolute virtual path with no `.` or `..`, so it
//! cannot name anything above the root.

pub mod lister;
pub mod local;

pub use local::LocalFs;

use std::io;

/// Storage operations needed by the file commands.
///
/// All `path` arguments are virtual paths already passed through
/// [`FileSystem::resolve`].
pub trait FileSystem: Send + Sync {
    /// Resolves `requested` against the working directory `cwd`.
    fn resolve(&self, cwd: &str, requested: &str) -> String;

    /// Formats a listing of the directory at `path`.
    fn list(&self, path: &str) -> io::Result<String>;

    /// Creates `path` and any missing parents. Returns false if it already
    /// existed.
    fn mkdir(&self, path: &str) -> io::Result<bool>;

    /// Removes the directory `path` and everything below it. Returns false
    /// if there was no directory to remove.
    fn rmdir(&self, path: &str) -> io::Result<bool>;

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Creates or truncates `path` and writes `data` to it.
    fn write_file(&self, path: &str, data: &[u8]) -> io::Result<()>;

    fn is_dir(&self, path: &str) -> bool;
}

/// Lexically resolves `requested` against `cwd`, expanding `~` to `home`.
pub fn resolve_virtual(cwd: &str, requested: &str, home: &str) -> String {
    let requested = requested.trim();

    let (base, rest) = if requested == "~" {
        (home, "")
    } else if let Some(rest) = requested.strip_prefix("~/") {
        (home, rest)
    } else if requested.starts_with('/') {
        ("/", requested)
    } else {
        (cwd, requested)
    };

    let mut parts: Vec<&str> = Vec::new();
    for component in base.split('/').chain(rest.split('/')) {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }

    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}
