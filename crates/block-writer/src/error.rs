use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while writing or reading a block directory.
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Nothing was committed before the flush
    #[error("no series appended, aborting")]
    NoSeries,

    #[error("Block directory already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
}
