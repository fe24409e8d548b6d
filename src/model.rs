//! Core data types shared by every pipeline stage.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};

/// A decoded, hashed raster image as produced by the fingerprinter.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RasterImage {
    /// Hex-encoded SHA3-256 digest of the downsampled pixel buffer.
    pub hash: String,
    pub path: PathBuf,
    pub byte_size: u64,
}

/// A set of `RasterImage`s sharing the same content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub hash: String,
    pub members: Vec<RasterImage>,
}

/// Whether a `FileEntry` is the kept copy or a deletion candidate within
/// its group. The first entry after creation-time ordering is `Original`;
/// every other member is `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Original,
    Copy,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Original => "Original",
            Kind::Copy => "Copy",
        }
    }
}

/// One row of the review queue: a single file within a duplicate group,
/// annotated with display-ready text and selection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub file_id: String,
    pub group_id: String,
    pub hash: String,
    pub full_path: PathBuf,
    pub display_path: String,
    pub created_at: String,
    pub size_text: String,
    pub selected: bool,
    pub kind: Kind,
    pub page: usize,
    /// Monotonically increasing serial number assigned at ingest time,
    /// preserved across deletions. Backs the previous/next-page queries.
    pub sn: u64,
}

/// Formats a byte count using 1000-based units with three decimal places,
/// matching the original implementation's `filesize()` helper.
pub fn format_filesize(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1000.0 && unit < UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{:.0} {}", size, UNITS[unit])
    } else {
        format!("{:.3} {}", size, UNITS[unit])
    }
}

/// Formats a timestamp as `YYYY-MM-DD HH:MM:SS` in local time.
pub fn format_timestamp(time: SystemTime) -> String {
    let dt: DateTime<Local> = time.into();
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Builds a display path relative to `root`, prefixed with `.`, matching
/// the original's `child_path = "." + full_path[len(directory):]`.
pub fn display_path(root: &Path, full: &Path) -> String {
    match full.strip_prefix(root) {
        Ok(rel) => format!("./{}", rel.display()),
        Err(_) => full.display().to_string(),
    }
}

/// Orders a set of paths sharing a duplicate hash by creation time,
/// breaking ties deterministically.
///
/// Mirrors the original's `sort_photos_by_creation_time`: paths are first
/// sorted descending lexicographically, then bucketed by creation time
/// into a `BTreeMap` of vectors (never a single-value map, so same-time
/// duplicates are never dropped), then flattened in ascending time order.
pub fn sort_by_creation_time(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut pre_sorted: Vec<PathBuf> = paths.to_vec();
    pre_sorted.sort_by(|a, b| b.cmp(a));

    let mut by_ctime: std::collections::BTreeMap<SystemTime, Vec<PathBuf>> =
        std::collections::BTreeMap::new();
    for path in pre_sorted {
        let ctime = std::fs::metadata(&path)
            .and_then(|m| m.created().or_else(|_| m.modified()))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        by_ctime.entry(ctime).or_default().push(path);
    }

    by_ctime.into_values().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_bytes() {
        assert_eq!(format_filesize(512), "512 B");
    }

    #[test]
    fn formats_kilobytes() {
        assert_eq!(format_filesize(1_500), "1.500 KB");
    }

    #[test]
    fn formats_megabytes() {
        assert_eq!(format_filesize(2_500_000), "2.500 MB");
    }

    #[test]
    fn formats_gigabytes() {
        assert_eq!(format_filesize(3_200_000_000), "3.200 GB");
    }

    #[test]
    fn display_path_is_relative_with_dot_prefix() {
        let root = Path::new("/photos");
        let full = Path::new("/photos/sub/a.jpg");
        assert_eq!(display_path(root, full), "./sub/a.jpg");
    }

    #[test]
    fn sort_by_creation_time_keeps_same_time_members() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        std::fs::write(&a, b"x").unwrap();
        std::fs::write(&b, b"y").unwrap();

        let ordered = sort_by_creation_time(&[a.clone(), b.clone()]);
        assert_eq!(ordered.len(), 2);
        assert!(ordered.contains(&a));
        assert!(ordered.contains(&b));
    }
}
