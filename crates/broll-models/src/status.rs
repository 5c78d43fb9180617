//! API response schemas.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskId, TaskStatus};

/// Message returned when a task is accepted.
pub const TASK_QUEUED_MESSAGE: &str = "Task queued successfully";

/// Response to a merge submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskSubmitResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub message: String,
}

impl TaskSubmitResponse {
    pub fn queued(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Queued,
            message: TASK_QUEUED_MESSAGE.to_string(),
        }
    }
}

/// Snapshot of a task returned by the status endpoint.
///
/// Every field is always present; absent values serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskStatusResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Public download URL, present only on success
    pub video_url: Option<String>,
    /// Failure reason, present only on failure
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskStatusResponse {
    /// Build a response from a task, resolving the artifact against the
    /// public base URL.
    pub fn from_task(task: &Task, public_base_url: &str) -> Self {
        let video_url = task
            .output_ref
            .as_ref()
            .map(|name| format!("{}/video/{}", public_base_url.trim_end_matches('/'), name));

        Self {
            task_id: task.id,
            status: task.status,
            video_url,
            error: task.error.clone(),
            created_at: task.created_at,
            updated_at: task.updated_at,
            completed_at: task.completed_at,
        }
    }
}
