//! Partitions fingerprinted images into duplicate groups by content hash.
//!
//! Two strategies exist behind [`group`]: a serial pairwise comparison
//! for small record sets, and a batch-parallel strategy for large ones.
//! Both produce identical results; the parallel strategy exists purely
//! for throughput on large collections, and is the only one that reports
//! progress or honors cancellation (the serial strategy runs to
//! completion in one coarse step, matching the original's synchronous
//! `detect_duplicates_serially`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::model::{DuplicateGroup, RasterImage};
use crate::pool::PoolKind;
use crate::progress::Progress;

/// Above this many records, `group` switches to the batch-parallel
/// strategy.
pub const BATCH_THRESHOLD: usize = 1000;

/// Groups `images` by content hash, keeping only hashes shared by two or
/// more images (a unique image is not a duplicate of anything and is
/// dropped from the result). Switches to the batch-parallel strategy
/// above `threshold` records, regardless of `pool_kind` — both worker
/// pool shapes use the same in-process `rayon`-driven batching for
/// grouping, since the comparisons are CPU-bound and cheap enough that
/// re-exec'ing child processes buys nothing here.
pub fn group(
    images: &[RasterImage],
    pool_kind: PoolKind,
    threshold: usize,
    progress: &Progress,
    cancel: &Arc<AtomicBool>,
) -> Vec<DuplicateGroup> {
    let _ = pool_kind;
    let duplicates = if images.len() <= threshold {
        group_serial(images)
    } else {
        group_batch_parallel(images, progress, cancel)
    };

    duplicates
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(hash, members)| DuplicateGroup { hash, members })
        .collect()
}

/// Forces the serial strategy regardless of record count. Used by the
/// orchestrator as a fallback when the batch-parallel strategy fails.
pub fn group_forcing_serial(images: &[RasterImage]) -> Vec<DuplicateGroup> {
    group_serial(images)
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(hash, members)| DuplicateGroup { hash, members })
        .collect()
}

/// Pairwise comparison of every combination, mirroring the original's
/// `itertools.combinations` approach. O(n^2) but simple and exact; used
/// below the batch threshold where that cost is negligible.
fn group_serial(images: &[RasterImage]) -> HashMap<String, Vec<RasterImage>> {
    let mut duplicates: HashMap<String, Vec<RasterImage>> = HashMap::new();

    for i in 0..images.len() {
        for j in (i + 1)..images.len() {
            if images[i].hash == images[j].hash {
                let entry = duplicates.entry(images[i].hash.clone()).or_default();
                if entry.is_empty() {
                    entry.push(images[i].clone());
                }
                if !entry.iter().any(|r| r.path == images[j].path) {
                    entry.push(images[j].clone());
                }
            }
        }
    }

    duplicates
}

/// Splits `images` into `n` batches (`n` = available parallelism), sized
/// as evenly as possible with any remainder distributed one-per-batch
/// into the earliest batches — mirroring `reshape_tuple1d`. Each batch
/// runs on its own thread and is compared against the *full* input set;
/// as each batch finishes, its partial result is merged into one
/// accumulating map, a `DupRunning(completed, total)` progress event is
/// published, and the cancellation flag is checked — a request observed
/// between two batch completions stops the merge early, leaving any
/// still-running batches' results discarded. Unlike the original Python
/// implementation, the merge step properly extends the existing entry
/// instead of computing and discarding a set union, so duplicates found
/// by different batches are never silently lost.
fn group_batch_parallel(
    images: &[RasterImage],
    progress: &Progress,
    cancel: &Arc<AtomicBool>,
) -> HashMap<String, Vec<RasterImage>> {
    let n = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .max(1)
        .min(images.len().max(1));
    let batches = reshape(images, n);
    let total_batches = batches.len();

    let all = Arc::new(images.to_vec());
    let (tx, rx) = crossbeam_channel::unbounded();

    let handles: Vec<_> = batches
        .into_iter()
        .map(|batch| {
            let tx = tx.clone();
            let all = Arc::clone(&all);
            std::thread::spawn(move || {
                let partial = check_hash_duplication(&batch, &all);
                let _ = tx.send(partial);
            })
        })
        .collect();
    drop(tx);

    let mut merged: HashMap<String, Vec<RasterImage>> = HashMap::new();
    let mut completed = 0;
    for partial in rx {
        completed += 1;
        progress.send_running_dup(completed, total_batches);
        for (hash, members) in partial {
            let entry = merged.entry(hash).or_default();
            for member in members {
                if !entry.iter().any(|r: &RasterImage| r.path == member.path) {
                    entry.push(member);
                }
            }
        }
        if cancel.load(Ordering::Relaxed) {
            log::info!(
                "grouping cancelled after {}/{} batches",
                completed,
                total_batches
            );
            break;
        }
    }

    for handle in handles {
        let _ = handle.join();
    }

    merged
}

/// Splits `items` into `n` roughly-equal contiguous batches; if `n` does
/// not evenly divide `items.len()`, the first `remainder` batches get one
/// extra element each.
fn reshape<T: Clone>(items: &[T], n: usize) -> Vec<Vec<T>> {
    if n == 0 || items.is_empty() {
        return vec![items.to_vec()];
    }
    let base_size = items.len() / n;
    let remainder = items.len() % n;

    let mut batches = Vec::with_capacity(n);
    let mut offset = 0;
    for i in 0..n {
        let size = base_size + if i < remainder { 1 } else { 0 };
        if size == 0 {
            continue;
        }
        batches.push(items[offset..offset + size].to_vec());
        offset += size;
    }
    batches
}

/// For each image in `batch`, compares it against every image in `all`,
/// recording hash matches. Mirrors `check_hash_duplication`: a `checked`
/// set avoids emitting the same pair twice from one batch's perspective,
/// but distinct batches may still independently discover the same pair,
/// which the caller's merge step dedupes by path.
fn check_hash_duplication(
    batch: &[RasterImage],
    all: &[RasterImage],
) -> HashMap<String, Vec<RasterImage>> {
    let mut duplicates: HashMap<String, Vec<RasterImage>> = HashMap::new();
    let mut checked: std::collections::HashSet<&std::path::Path> = std::collections::HashSet::new();

    for item in batch {
        for other in all {
            if other.path == item.path {
                continue;
            }
            if checked.contains(other.path.as_path()) {
                continue;
            }
            if item.hash == other.hash {
                let entry = duplicates.entry(item.hash.clone()).or_default();
                if !entry.iter().any(|r| r.path == item.path) {
                    entry.push(item.clone());
                }
                if !entry.iter().any(|r| r.path == other.path) {
                    entry.push(other.clone());
                }
            }
        }
        checked.insert(item.path.as_path());
    }

    duplicates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn img(hash: &str, path: &str) -> RasterImage {
        RasterImage {
            hash: hash.to_string(),
            path: PathBuf::from(path),
            byte_size: 100,
        }
    }

    fn no_cancel() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn serial_groups_matching_hashes() {
        let images = vec![
            img("h1", "a.jpg"),
            img("h1", "b.jpg"),
            img("h2", "c.jpg"),
        ];
        let (progress, _rx) = Progress::channel();
        let groups = group(&images, PoolKind::Thread, BATCH_THRESHOLD, &progress, &no_cancel());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].hash, "h1");
        assert_eq!(groups[0].members.len(), 2);
    }

    #[test]
    fn unique_images_produce_no_groups() {
        let images = vec![img("h1", "a.jpg"), img("h2", "b.jpg")];
        let (progress, _rx) = Progress::channel();
        assert!(group(&images, PoolKind::Thread, BATCH_THRESHOLD, &progress, &no_cancel()).is_empty());
    }

    #[test]
    fn serial_and_parallel_agree_on_membership() {
        let mut images = Vec::new();
        for i in 0..50 {
            let hash = format!("h{}", i % 7);
            images.push(img(&hash, &format!("f{}.jpg", i)));
        }

        let (progress, _rx) = Progress::channel();
        let serial = group_serial(&images);
        let parallel = group_batch_parallel(&images, &progress, &no_cancel());

        let mut serial_sizes: Vec<usize> = serial.values().map(|v| v.len()).collect();
        let mut parallel_sizes: Vec<usize> = parallel.values().map(|v| v.len()).collect();
        serial_sizes.sort();
        parallel_sizes.sort();
        assert_eq!(serial_sizes, parallel_sizes);
    }

    #[test]
    fn low_threshold_routes_through_batch_parallel_strategy() {
        let images = vec![
            img("h1", "a.jpg"),
            img("h1", "b.jpg"),
            img("h2", "c.jpg"),
            img("h2", "d.jpg"),
        ];
        let (progress, rx) = Progress::channel();
        let groups = group(&images, PoolKind::Thread, 1, &progress, &no_cancel());
        assert_eq!(groups.len(), 2);

        let saw_dup_running = rx
            .try_iter()
            .any(|event| matches!(event, crate::progress::Event::DupRunning { .. }));
        assert!(saw_dup_running);
    }

    #[test]
    fn cancellation_stops_batch_merge_early() {
        let mut images = Vec::new();
        for i in 0..20 {
            images.push(img(&format!("h{}", i % 5), &format!("f{}.jpg", i)));
        }
        let (progress, _rx) = Progress::channel();
        let cancel = Arc::new(AtomicBool::new(true));
        // Should return without hanging even though cancellation is
        // already requested before the first batch completes.
        let result = group_batch_parallel(&images, &progress, &cancel);
        assert!(result.len() <= 5);
    }

    #[test]
    fn reshape_distributes_remainder_to_earliest_batches() {
        let items: Vec<u32> = (0..10).collect();
        let batches = reshape(&items, 3);
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
    }
}
