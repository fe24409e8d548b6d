//! Decodes candidate image files, downsamples them, and computes a
//! cryptographic content hash.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha3::{Digest, Sha3_256};

use crate::model::RasterImage;
use crate::pool::{self, PoolKind, Shape};
use crate::progress::Progress;
use crate::walker;

/// Images are downsampled to roughly 1/10th of their native resolution
/// per dimension before hashing, to absorb lossless re-encodes.
pub const DOWNSAMPLE_FACTOR: u32 = 10;
/// If downsampling a dimension would take it below this many pixels, the
/// native size is hashed instead.
pub const MIN_RESIZE_DIMENSION: u32 = 60;
/// Per-item wall-clock budget before a fingerprint attempt is abandoned.
pub const ITEM_TIMEOUT: Duration = Duration::from_secs(600);

/// Decodes and hashes a single file, returning `None` if the file is not
/// a readable/decodable image. Mirrors `scandir_images`: any decode
/// failure is a skip, not an error.
pub fn fingerprint_one(path: &Path) -> Option<RasterImage> {
    let byte_size = std::fs::metadata(path).ok()?.len();
    let img = image::open(path).ok()?;

    let (w, h) = (img.width(), img.height());
    let (new_w, new_h) = downsample_dimensions(w, h);

    let resized = if (new_w, new_h) == (w, h) {
        img
    } else {
        img.resize_exact(new_w, new_h, image::imageops::FilterType::Nearest)
    };

    let rgba = resized.to_rgba8();
    let mut hasher = Sha3_256::new();
    hasher.update(rgba.as_raw());
    let hash = hex::encode(hasher.finalize());

    Some(RasterImage {
        hash,
        path: path.to_path_buf(),
        byte_size,
    })
}

fn downsample_dimensions(w: u32, h: u32) -> (u32, u32) {
    let new_w = w / DOWNSAMPLE_FACTOR;
    let new_h = h / DOWNSAMPLE_FACTOR;
    if new_w < MIN_RESIZE_DIMENSION || new_h < MIN_RESIZE_DIMENSION {
        (w, h)
    } else {
        (new_w, new_h)
    }
}

/// Fingerprints everything beneath `root`, selecting the work-item shape
/// from `descendant_dirs` (empty means the root has no subdirectories,
/// so work is dispatched per-file; otherwise per-directory over `root`
/// plus every descendant) and the pool shape from `kind`. Reports
/// `FindRunning`/`FindCompleted` progress and honors cancellation.
pub fn fingerprint_all(
    root: &Path,
    descendant_dirs: &[PathBuf],
    shape: Shape,
    kind: PoolKind,
    progress: &Progress,
    cancel: &Arc<AtomicBool>,
) -> crate::error::Result<Vec<RasterImage>> {
    let start = Instant::now();

    if cancel.load(Ordering::Relaxed) {
        return Ok(Vec::new());
    }

    let records = match shape {
        Shape::PerFile => {
            let files = walker::list_images_in_dir(root);
            dispatch(&files, shape, kind, progress, cancel)?
        }
        Shape::PerDirectory => {
            let mut dirs = Vec::with_capacity(descendant_dirs.len() + 1);
            dirs.push(root.to_path_buf());
            dirs.extend_from_slice(descendant_dirs);
            dispatch(&dirs, shape, kind, progress, cancel)?
        }
    };

    progress.send(crate::progress::Event::FindCompleted {
        records: records.len(),
        start,
        end: Instant::now(),
    });

    Ok(records)
}

fn dispatch(
    items: &[PathBuf],
    shape: Shape,
    kind: PoolKind,
    progress: &Progress,
    cancel: &Arc<AtomicBool>,
) -> crate::error::Result<Vec<RasterImage>> {
    match kind {
        PoolKind::Thread => Ok(fingerprint_thread_shape(items, shape, progress, cancel)),
        PoolKind::Process => pool::fingerprint_concurrently(items, shape, progress, cancel),
    }
}

fn fingerprint_thread_shape(
    items: &[PathBuf],
    shape: Shape,
    progress: &Progress,
    cancel: &Arc<AtomicBool>,
) -> Vec<RasterImage> {
    use rayon::prelude::*;

    let done = AtomicUsize::new(0);
    let total = items.len();

    match shape {
        Shape::PerFile => items
            .par_iter()
            .filter_map(|path| {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                let result = fingerprint_with_timeout(path);
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                progress.send_running_find(n, total);
                result
            })
            .collect(),
        Shape::PerDirectory => items
            .par_iter()
            .flat_map(|dir| {
                if cancel.load(Ordering::Relaxed) {
                    return Vec::new();
                }
                let mut results = Vec::new();
                for file in walker::list_images_in_dir(dir) {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    if let Some(image) = fingerprint_with_timeout(&file) {
                        results.push(image);
                    }
                }
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                progress.send_running_find(n, total);
                results
            })
            .collect(),
    }
}

fn fingerprint_with_timeout(path: &Path) -> Option<RasterImage> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let path = path.to_path_buf();
    std::thread::spawn(move || {
        let result = fingerprint_one(&path);
        let _ = tx.send(result);
    });
    match rx.recv_timeout(ITEM_TIMEOUT) {
        Ok(result) => result,
        Err(_) => {
            log::warn!("fingerprinting timed out after {:?}", ITEM_TIMEOUT);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downsamples_large_dimensions() {
        assert_eq!(downsample_dimensions(1000, 2000), (100, 200));
    }

    #[test]
    fn falls_back_to_native_size_when_too_small() {
        assert_eq!(downsample_dimensions(100, 100), (100, 100));
    }

    #[test]
    fn fingerprints_a_generated_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        let img = image::RgbaImage::from_pixel(200, 200, image::Rgba([10, 20, 30, 255]));
        img.save(&path).unwrap();

        let result = fingerprint_one(&path).expect("should decode");
        assert_eq!(result.path, path);
        assert_eq!(result.hash.len(), 64);
    }

    #[test]
    fn identical_pixels_hash_identically() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        let img = image::RgbaImage::from_pixel(80, 80, image::Rgba([1, 2, 3, 255]));
        img.save(&a).unwrap();
        img.save(&b).unwrap();

        let ra = fingerprint_one(&a).unwrap();
        let rb = fingerprint_one(&b).unwrap();
        assert_eq!(ra.hash, rb.hash);
    }

    #[test]
    fn non_image_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(fingerprint_one(&path).is_none());
    }

    #[test]
    fn per_file_shape_scans_flat_directory() {
        let dir = tempfile::tempdir().unwrap();
        let img = image::RgbaImage::from_pixel(80, 80, image::Rgba([5, 5, 5, 255]));
        img.save(dir.path().join("a.png")).unwrap();
        img.save(dir.path().join("b.png")).unwrap();

        let (progress, _rx) = crate::progress::Progress::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let shape = Shape::select(&[]);
        assert_eq!(shape, Shape::PerFile);

        let records = fingerprint_all(dir.path(), &[], shape, PoolKind::Thread, &progress, &cancel)
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn per_directory_shape_scans_root_and_descendants() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let img = image::RgbaImage::from_pixel(80, 80, image::Rgba([9, 9, 9, 255]));
        img.save(dir.path().join("a.png")).unwrap();
        img.save(dir.path().join("sub/b.png")).unwrap();

        let descendants = walker::walk(dir.path());
        let shape = Shape::select(&descendants);
        assert_eq!(shape, Shape::PerDirectory);

        let (progress, _rx) = crate::progress::Progress::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let records = fingerprint_all(
            dir.path(),
            &descendants,
            shape,
            PoolKind::Thread,
            &progress,
            &cancel,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
    }
}
