use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::pool::PoolKind;

/// Selects the UI composition, not the core pipeline behavior — `Find`,
/// `Table`, and `Gallery` all walk, fingerprint, and group the same way;
/// they differ only in how results are presented. The headless driver
/// in `main` treats `Table`/`Gallery` as `Find` with a different report
/// layout; deletion is controlled independently by `--clean`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Report duplicate groups as a flat summary.
    Find,
    /// Report duplicate groups as a paged table.
    Table,
    /// Report duplicate groups as an image gallery.
    Gallery,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Layout {
    Horizontal,
    Vertical,
}

#[derive(Parser)]
#[command(name = "dupe-photos", about = "Finds and manages duplicate raster images beneath a directory tree")]
pub struct Cli {
    /// Directory to scan for duplicate images
    pub root: PathBuf,

    /// UI composition to report results in
    #[arg(long, value_enum, default_value_t = Mode::Find)]
    pub mode: Mode,

    /// Review-queue layout hint, passed through unused by the headless
    /// driver but kept for parity with the windowed reviewer
    #[arg(long, value_enum, default_value_t = Layout::Vertical)]
    pub layout: Layout,

    /// Worker pool shape: in-process threads, or re-exec'd child
    /// processes. Defaults to `process` for `find`/`table`, and is
    /// forced to `thread` for `gallery`, where child-process output
    /// can't feed a live image widget.
    #[arg(long = "cfe", value_enum)]
    pub cfe: Option<PoolKind>,

    /// After scanning, delete every file marked `Copy` within each
    /// duplicate group. Independent of `--mode`.
    #[arg(long)]
    pub clean: bool,

    /// Write a text report of every duplicate group to this file
    #[arg(long, value_name = "FILE")]
    pub dump: Option<PathBuf>,

    /// Above this many fingerprinted records, grouping switches to the
    /// batch-parallel strategy
    #[arg(long, default_value_t = crate::grouper::BATCH_THRESHOLD)]
    pub batch_threshold: usize,

    /// Size of the in-process rayon thread pool used by the thread pool
    /// shape. Defaults to the available parallelism.
    #[arg(long)]
    pub threads: Option<usize>,
}

impl Cli {
    /// Resolves `--cfe` against `--mode`, applying the documented
    /// default: `process` for `find`/`table`, forced to `thread` for
    /// `gallery` regardless of what was passed.
    pub fn resolved_cfe(&self) -> PoolKind {
        if self.mode == Mode::Gallery {
            return PoolKind::Thread;
        }
        self.cfe.unwrap_or(PoolKind::Process)
    }
}
