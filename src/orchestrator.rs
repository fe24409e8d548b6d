//! Drives the Walker → Fingerprinter → Grouper pipeline on a background
//! thread, reports progress, and supports cooperative cancellation and
//! deletion of selected files.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::grouper;
use crate::model::DuplicateGroup;
use crate::pool::{PoolKind, Shape};
use crate::progress::{Event, Progress};
use crate::review_store::ReviewStore;
use crate::{fingerprint, walker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Walking,
    Fingerprinting,
    Grouping,
    Done,
    Cancelled,
}

pub struct Orchestrator {
    state: Arc<Mutex<State>>,
    cancel: Arc<AtomicBool>,
    store: Arc<Mutex<ReviewStore>>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::Idle)),
            cancel: Arc::new(AtomicBool::new(false)),
            store: Arc::new(Mutex::new(ReviewStore::new())),
        }
    }

    pub fn state(&self) -> State {
        *self.state.lock().unwrap()
    }

    pub fn store(&self) -> Arc<Mutex<ReviewStore>> {
        Arc::clone(&self.store)
    }

    /// Requests cancellation. Already-running stages check this flag at
    /// natural yield points (per-file in the walker, per-item in the
    /// fingerprinter and grouper) and stop promptly rather than
    /// instantly; the final state becomes `Cancelled` once the background
    /// thread observes the request.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Starts the pipeline on a background thread and returns
    /// immediately. The caller drains `rx` for progress and polls
    /// `state()`/`store()` to react to completion; `ReviewStore` should
    /// only be read or mutated from the calling thread once `state()`
    /// reports `Done`.
    pub fn run(
        &self,
        root: PathBuf,
        pool_kind: PoolKind,
        batch_threshold: usize,
    ) -> crossbeam_channel::Receiver<Event> {
        let (progress, rx) = Progress::channel();
        let state = Arc::clone(&self.state);
        let cancel = Arc::clone(&self.cancel);
        let store = Arc::clone(&self.store);

        cancel.store(false, Ordering::Relaxed);
        *state.lock().unwrap() = State::Walking;

        std::thread::spawn(move || {
            if let Err(err) = drive(
                &root,
                pool_kind,
                batch_threshold,
                &progress,
                &cancel,
                &state,
                &store,
            ) {
                log::warn!("pipeline run failed: {}", err);
                *state.lock().unwrap() = State::Idle;
            }
        });

        rx
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn drive(
    root: &Path,
    pool_kind: PoolKind,
    batch_threshold: usize,
    progress: &Progress,
    cancel: &Arc<AtomicBool>,
    state: &Arc<Mutex<State>>,
    store: &Arc<Mutex<ReviewStore>>,
) -> Result<()> {
    if !root.is_dir() {
        return Err(Error::InvalidRoot(root.to_path_buf()));
    }

    *state.lock().unwrap() = State::Walking;
    let descendant_dirs = walker::walk(root);
    if cancel.load(Ordering::Relaxed) {
        *state.lock().unwrap() = State::Cancelled;
        return Ok(());
    }

    // Scheduling-shape selection: per-file when the root has no
    // subdirectories, per-directory otherwise. Made an explicit,
    // logged lifecycle step rather than buried inside the fingerprinter.
    let shape = Shape::select(&descendant_dirs);
    log::info!("selected {:?} work-item shape for {:?}", shape, root);

    *state.lock().unwrap() = State::Fingerprinting;
    let images = fingerprint::fingerprint_all(
        root,
        &descendant_dirs,
        shape,
        pool_kind,
        progress,
        cancel,
    )?;
    if cancel.load(Ordering::Relaxed) {
        *state.lock().unwrap() = State::Cancelled;
        return Ok(());
    }

    *state.lock().unwrap() = State::Grouping;
    let dup_start = Instant::now();
    let groups = group_with_fallback(&images, pool_kind, batch_threshold, progress, cancel);
    progress.send(Event::DupCompleted {
        groups: groups.len(),
        start: dup_start,
        end: Instant::now(),
    });

    if cancel.load(Ordering::Relaxed) {
        *state.lock().unwrap() = State::Cancelled;
        return Ok(());
    }

    let mut guard = store.lock().unwrap();
    guard.reset();
    guard.populate(root, groups)?;
    drop(guard);
    *state.lock().unwrap() = State::Done;
    Ok(())
}

/// Picks the grouping strategy by record count, falling back to the
/// serial strategy if the batch-parallel one fails to make progress —
/// mirroring `_detect_duplicates`'s `ValueError`-triggered fallback in
/// the original.
fn group_with_fallback(
    images: &[crate::model::RasterImage],
    pool_kind: PoolKind,
    batch_threshold: usize,
    progress: &Progress,
    cancel: &Arc<AtomicBool>,
) -> Vec<DuplicateGroup> {
    if images.len() <= batch_threshold {
        return grouper::group(images, pool_kind, batch_threshold, progress, cancel);
    }
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        grouper::group(images, pool_kind, batch_threshold, progress, cancel)
    }));
    result.unwrap_or_else(|_| {
        log::warn!("batch-parallel grouping failed, falling back to serial");
        grouper::group_forcing_serial(images)
    })
}

/// Deletes every currently-selected file from disk and from the review
/// store. Returns the number of files removed; I/O failures for
/// individual files are logged and skipped rather than aborting the
/// whole batch.
pub fn delete_selected(store: &Mutex<ReviewStore>) -> usize {
    let selected = store.lock().unwrap().selected_entries(true);
    let mut removed = 0;
    for (file_id, path) in selected {
        match std::fs::remove_file(&path) {
            Ok(()) => {
                store.lock().unwrap().delete_item(&file_id);
                removed += 1;
            }
            Err(err) => {
                log::warn!("failed to delete {:?}: {}", path, err);
            }
        }
    }
    removed
}
