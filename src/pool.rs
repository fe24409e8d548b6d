//! The two worker-pool "shapes" the fingerprinter can run under: an
//! in-process thread pool, or a pool of re-exec'd child processes. Both
//! are driven through the same `PoolKind`, and both accept work items
//! shaped either per-file or per-directory (see [`Shape`]) so callers
//! don't need to special-case which is in effect.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::model::RasterImage;
use crate::progress::Progress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PoolKind {
    Thread,
    Process,
}

/// The unit of work handed to each pool worker: either one file, or one
/// directory (whose files the worker lists and fingerprints itself).
/// Mirrors the original's two distinct dispatch functions —
/// `get_rasterimages_in_one_folder_concurrently` (per-file, used when the
/// root has no subdirectories) and `scandir_images_concurrently`
/// (per-directory, used otherwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    PerFile,
    PerDirectory,
}

impl Shape {
    /// Per-file parallelism is preferred when the root has no
    /// subdirectories; per-directory parallelism otherwise.
    pub fn select(descendant_dirs: &[PathBuf]) -> Shape {
        if descendant_dirs.is_empty() {
            Shape::PerFile
        } else {
            Shape::PerDirectory
        }
    }
}

/// Name of the hidden subcommand a child process runs under when acting
/// as a process-pool worker.
pub const WORKER_SUBCOMMAND: &str = "__fingerprint_worker";

/// Fingerprints `items` (files or directories, per `shape`) using the
/// process pool shape: each item is dispatched to its own re-exec'd child
/// process, run concurrently across a small worker pool, reporting
/// `(completed, total)` progress as each item finishes and honoring
/// cancellation between items. A child that runs past
/// [`crate::fingerprint::ITEM_TIMEOUT`] is killed and treated as a skip,
/// matching the thread shape's per-item timeout.
pub fn fingerprint_concurrently(
    items: &[PathBuf],
    shape: Shape,
    progress: &Progress,
    cancel: &Arc<AtomicBool>,
) -> Result<Vec<RasterImage>> {
    let exe = std::env::current_exe().map_err(Error::Io)?;
    let total = items.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let worker_count = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(total);

    let queue: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(items.to_vec()));
    let results: Arc<Mutex<Vec<RasterImage>>> = Arc::new(Mutex::new(Vec::new()));
    let done = Arc::new(AtomicUsize::new(0));
    let first_error: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let exe = exe.clone();
            let queue = Arc::clone(&queue);
            let results = Arc::clone(&results);
            let done = Arc::clone(&done);
            let first_error = Arc::clone(&first_error);
            let cancel = Arc::clone(cancel);

            scope.spawn(move || loop {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                let item = queue.lock().unwrap().pop();
                let Some(item) = item else {
                    break;
                };

                match run_worker_subcommand(&exe, &item, shape) {
                    Ok(records) => results.lock().unwrap().extend(records),
                    Err(err) => {
                        let mut slot = first_error.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(err);
                        }
                    }
                }

                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                progress.send_running_find(n, total);
            });
        }
    });

    if let Some(err) = first_error.lock().unwrap().take() {
        return Err(err);
    }

    Ok(Arc::try_unwrap(results)
        .expect("all worker threads joined")
        .into_inner()
        .unwrap())
}

/// Runs one child process for `item`, waiting up to
/// `crate::fingerprint::ITEM_TIMEOUT` before killing it and giving up.
/// The child prints zero or more newline-delimited JSON `RasterImage`
/// records to stdout (zero for a `PerFile` item that failed to decode,
/// one per decoded file for a `PerDirectory` item).
fn run_worker_subcommand(exe: &Path, item: &Path, shape: Shape) -> Result<Vec<RasterImage>> {
    let shape_flag = match shape {
        Shape::PerFile => "file",
        Shape::PerDirectory => "dir",
    };

    let mut child = Command::new(exe)
        .arg(WORKER_SUBCOMMAND)
        .arg(shape_flag)
        .arg(item)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::PoolFailure(e.to_string()))?;

    let deadline = Instant::now() + crate::fingerprint::ITEM_TIMEOUT;
    loop {
        match child.try_wait().map_err(|e| Error::PoolFailure(e.to_string()))? {
            Some(_status) => break,
            None => {
                if Instant::now() >= deadline {
                    log::warn!(
                        "worker for {:?} exceeded {:?}, killing",
                        item,
                        crate::fingerprint::ITEM_TIMEOUT
                    );
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok(Vec::new());
                }
                std::thread::sleep(std::time::Duration::from_millis(20));
            }
        }
    }

    let mut stdout = child.stdout.take().expect("child stdout was piped");
    let mut buf = String::new();
    stdout.read_to_string(&mut buf).map_err(Error::Io)?;

    let mut records = Vec::new();
    for line in buf.as_str().lines() {
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(line)?);
    }
    Ok(records)
}

/// Entry point for the hidden worker subcommand: fingerprints `path` as
/// either a single file or a directory's worth of files (per `shape`),
/// writing each successfully-decoded `RasterImage` to stdout as one line
/// of JSON. Files that fail to decode simply produce no line.
pub fn run_worker(shape: Shape, path: &Path) {
    let images: Vec<RasterImage> = match shape {
        Shape::PerFile => crate::fingerprint::fingerprint_one(path).into_iter().collect(),
        Shape::PerDirectory => crate::walker::list_images_in_dir(path)
            .iter()
            .filter_map(|f| crate::fingerprint::fingerprint_one(f))
            .collect(),
    };

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    for image in &images {
        if let Ok(line) = serde_json::to_string(image) {
            let _ = writeln!(handle, "{}", line);
        }
    }
}
