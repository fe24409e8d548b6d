//! Error types for the pipeline library. Recoverable per-item failures
//! (decode errors, permission denials, timeouts) are handled locally by
//! the stage that encounters them and never become an `Error` value; this
//! type covers failures that abort a run.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("root path {0:?} does not exist or is not a directory")]
    InvalidRoot(PathBuf),

    #[error("worker pool failed: {0}")]
    PoolFailure(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode worker output: {0}")]
    WorkerProtocol(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
