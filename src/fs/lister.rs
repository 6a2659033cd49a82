//! Directory listing formatter.
//!
//! Produces the text block returned by LIST:
//!
//! ```text
//! Listing directory: /srv/data
//!
//! Name     Type  Size      Modified             Permissions
//! -------------------------------------------------------------
//! logs     DIR   -         2024-01-01 10:00:00  rwxr-xr-x
//! a.txt    FILE  12.00 B   2024-01-01 10:00:00  rw-r--r--
//! ```

use chrono::{DateTime, Local};
use std::fs::{self, DirEntry, Metadata};
use std::io;
use std::path::Path;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// One row of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub is_dir: bool,
    pub size: String,
    pub modified: String,
    pub permissions: String,
}

impl EntryInfo {
    fn from_entry(entry: &DirEntry) -> io::Result<Self> {
        let metadata = entry.metadata()?;
        let is_dir = metadata.is_dir();
        Ok(Self {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir,
            size: if is_dir {
                "-".to_string()
            } else {
                pretty_size(metadata.len())
            },
            modified: modified_time(&metadata),
            permissions: permissions(&metadata),
        })
    }

    fn kind(&self) -> &'static str {
        if self.is_dir {
            "DIR"
        } else {
            "FILE"
        }
    }
}

/// Lists `dir`, labelling the block with `display_path`.
pub fn list_directory(dir: &Path, display_path: &str) -> io::Result<String> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.and_then(|e| EntryInfo::from_entry(&e)))
        .collect::<io::Result<Vec<_>>>()?;

    // Directories first, then by name
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));

    Ok(render(display_path, &entries))
}

/// Renders a listing with left-aligned, padded columns.
pub fn render(display_path: &str, entries: &[EntryInfo]) -> String {
    let name_w = column_width("Name", entries.iter().map(|e| e.name.len()));
    let type_w = column_width("Type", entries.iter().map(|e| e.kind().len()));
    let size_w = column_width("Size", entries.iter().map(|e| e.size.len()));
    let modified_w = column_width("Modified", entries.iter().map(|e| e.modified.len()));

    let mut out = format!("Listing directory: {}\n\n", display_path);
    out.push_str(&format!(
        "{:<name_w$}{:<type_w$}{:<size_w$}{:<modified_w$}Permissions\n",
        "Name", "Type", "Size", "Modified",
    ));
    out.push_str(&"-".repeat(name_w + type_w + size_w + modified_w + 12));
    out.push('\n');

    for entry in entries {
        out.push_str(&format!(
            "{:<name_w$}{:<type_w$}{:<size_w$}{:<modified_w$}{}\n",
            entry.name,
            entry.kind(),
            entry.size,
            entry.modified,
            entry.permissions,
        ));
    }
    out
}

/// Column width: the widest cell plus two spaces of padding.
fn column_width(header: &str, cells: impl Iterator<Item = usize>) -> usize {
    cells.fold(header.len(), usize::max) + 2
}

/// Formats a byte count as `12.00 B`, `1.50 KB`, and so on.
pub fn pretty_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}

fn modified_time(metadata: &Metadata) -> String {
    match metadata.modified() {
        Ok(time) => DateTime::<Local>::from(time)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        Err(_) => "-".to_string(),
    }
}

#[cfg(unix)]
fn permissions(metadata: &Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;

    let mode = metadata.permissions().mode();
    let mut out = String::with_capacity(9);
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

#[cfg(not(unix))]
fn permissions(metadata: &Metadata) -> String {
    if metadata.permissions().readonly() {
        "r--r--r--".to_string()
    } else {
        "rw-rw-rw-".to_string()
    }
}
