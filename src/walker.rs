//! Recursive filesystem walk that discovers the directory tree beneath a
//! root. The Walker itself never opens an image; it hands descendant
//! directories to the Fingerprinter, which decides its own work-item
//! shape (per-file or per-directory) and lists each directory's files
//! itself.

use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "ico",
];

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Walks `root` depth-first, returning every descendant directory (never
/// `root` itself) in a deterministic, parent-before-children order.
/// Symlinks are never followed. A directory that cannot be read because
/// of a permission error is skipped (logged as a warning) rather than
/// aborting the whole walk, mirroring `fast_scandir`'s local
/// `PermissionError` handling in the original implementation.
pub fn walk(root: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    scan_dirs(root, &mut dirs);
    dirs
}

fn scan_dirs(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!("skipping directory {:?}: {}", dir, err);
            return;
        }
    };

    let mut subdirs = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_symlink() {
            continue;
        }
        if meta.is_dir() {
            subdirs.push(path);
        }
    }
    subdirs.sort();

    for subdir in subdirs {
        out.push(subdir.clone());
        scan_dirs(&subdir, out);
    }
}

/// Lists the candidate image files directly inside `dir` (not recursive),
/// sorted for determinism. Symlinks are never followed; an unreadable
/// directory yields an empty list and is logged as a warning rather than
/// treated as fatal.
pub fn list_images_in_dir(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!("skipping directory {:?}: {}", dir, err);
            return Vec::new();
        }
    };

    let mut files = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_symlink() {
            continue;
        }
        if meta.is_file() && is_image_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    files
}
