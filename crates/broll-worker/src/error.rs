//! Worker error types.
//!
//! The `Display` output of a pipeline error is what gets recorded on the
//! failed task, so each variant names the stage it came from.

use thiserror::Error;

use broll_media::{FetchError, MediaError, PlanError};
use broll_queue::QueueError;
use broll_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Cumulative size ceiling hit while downloading; the message stands alone.
    #[error("{0}")]
    SizeLimit(FetchError),

    #[error("Download failed: {0}")]
    Fetch(FetchError),

    #[error("Inspection failed: {0}")]
    Inspect(MediaError),

    #[error("Planning failed: {0}")]
    Plan(#[from] PlanError),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Task timed out after {0} seconds")]
    Timeout(u64),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Task store error: {0}")]
    Store(#[from] QueueError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<FetchError> for WorkerError {
    fn from(e: FetchError) -> Self {
        if e.is_size_limit() {
            Self::SizeLimit(e)
        } else {
            Self::Fetch(e)
        }
    }
}

impl WorkerError {
    /// Wrap a renderer failure, keeping the last line FFmpeg printed.
    pub fn render(e: MediaError) -> Self {
        let detail = match &e {
            MediaError::FfmpegFailed {
                stderr: Some(stderr), ..
            } => stderr.lines().last().map(|l| format!("{} ({})", e, l.trim())),
            _ => None,
        };
        Self::Render(detail.unwrap_or_else(|| e.to_string()))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::SizeLimit(_) => "size_limit",
            WorkerError::Fetch(_) => "fetch",
            WorkerError::Inspect(_) => "inspect",
            WorkerError::Plan(_) => "plan",
            WorkerError::Render(_) => "render",
            WorkerError::Timeout(_) => "timeout",
            WorkerError::Storage(_) => "storage",
            WorkerError::Store(_) => "store",
            WorkerError::Internal(_) => "internal",
        }
    }
}
