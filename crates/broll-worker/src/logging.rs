//! Structured task logging.
//!
//! Every line emitted while a task is processed carries the task id and
//! the operation, so a task's history can be filtered out of the log stream.

use tracing::{error, info, warn, Span};

use broll_models::TaskId;

/// Task logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    operation: String,
}

impl TaskLogger {
    /// Create a logger for one task and operation (e.g. `"merge_broll"`).
    pub fn new(task_id: &TaskId, operation: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            operation = %self.operation,
            "Task completed: {}", message
        );
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span that ties together everything logged below it, including
    /// lines from the media and storage crates.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "task",
            task_id = %self.task_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_logger_creation() {
        let task_id = TaskId::new();
        let logger = TaskLogger::new(&task_id, "merge_broll");

        assert_eq!(logger.task_id(), task_id.to_string());
        assert_eq!(logger.operation(), "merge_broll");
    }

    #[test]
    fn test_logging_without_subscriber_is_silent() {
        let logger = TaskLogger::new(&TaskId::new(), "merge_broll");
        let _guard = logger.create_span().entered();
        logger.log_start("7 sources");
        logger.log_progress("downloading");
        logger.log_warning("slow source");
        logger.log_error("boom");
        logger.log_completion("done");
    }
}
