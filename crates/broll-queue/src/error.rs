//! Queue and store error types.

use thiserror::Error;

use broll_models::{TaskId, TransitionError};

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Queue is full ({capacity} tasks pending)")]
    QueueFull { capacity: usize },

    #[error("Queue is closed")]
    QueueClosed,
}

impl QueueError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TaskNotFound(_))
    }
}
