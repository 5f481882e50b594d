//! Error types for the append pipeline.

use blockgen_core::Labels;
use series_generator::GeneratorError;
use thiserror::Error;

/// Errors that can occur while draining series into a sink.
#[derive(Error, Debug)]
pub enum AppendError {
    /// The series set failed to produce a series.
    #[error("series set: {0}")]
    SeriesSet(#[from] GeneratorError),

    /// Opening a writer handle failed.
    #[error("open appender: {0:#}")]
    Open(#[source] anyhow::Error),

    /// The sink rejected a sample; the worker's appender was rolled back.
    #[error("append {labels}: {source:#}")]
    Append {
        labels: Labels,
        #[source]
        source: anyhow::Error,
    },

    /// The sink rejected a sample and the rollback failed as well.
    #[error("append {labels}: {source:#}, rollback: {rollback:#}")]
    Rollback {
        labels: Labels,
        #[source]
        source: anyhow::Error,
        rollback: anyhow::Error,
    },

    /// Committing a worker's appender failed.
    #[error("commit: {0:#}")]
    Commit(#[source] anyhow::Error),

    /// Stopped because the token was cancelled, by the caller or by a
    /// failing sibling worker.
    #[error("append cancelled")]
    Cancelled,

    /// A worker task panicked or was aborted.
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl AppendError {
    /// Whether this error only reports a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppendError::Cancelled)
    }
}
