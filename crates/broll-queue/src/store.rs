//! Task store.
//!
//! The store is the only place task records change. Every mutation is a
//! single state-machine transition applied atomically to one task.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use broll_models::{MergeRequest, Task, TaskId, TaskStatus, TransitionError};

use crate::error::{QueueError, QueueResult};

/// Task counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub queued: usize,
    pub running: usize,
    pub success: usize,
    pub failed: usize,
}

impl TaskStats {
    pub fn total(&self) -> usize {
        self.queued + self.running + self.success + self.failed
    }
}

/// Persistence for task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Allocate an id and store a new `queued` task.
    async fn create(&self, request: MergeRequest) -> QueueResult<Task>;

    async fn get(&self, id: &TaskId) -> QueueResult<Option<Task>>;

    /// `queued -> running`
    async fn mark_running(&self, id: &TaskId) -> QueueResult<Task>;

    /// `running -> success`
    async fn mark_success(&self, id: &TaskId, output_ref: &str) -> QueueResult<Task>;

    /// `queued | running -> failed`
    async fn mark_failed(&self, id: &TaskId, error: &str) -> QueueResult<Task>;

    /// Terminal tasks completed at or before `cutoff`.
    async fn expired(&self, cutoff: DateTime<Utc>) -> QueueResult<Vec<Task>>;

    /// Evict a record.
    async fn remove(&self, id: &TaskId) -> QueueResult<Option<Task>>;

    async fn stats(&self) -> QueueResult<TaskStats>;

    /// Whether an artifact name belongs to a live record.
    async fn references_output(&self, output_ref: &str) -> QueueResult<bool>;
}

/// In-memory [`TaskStore`].
///
/// The map lock is only held to find or insert an entry; each task carries
/// its own lock, so updates to different tasks never wait on each other.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Arc<Mutex<Task>>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, id: &TaskId) -> QueueResult<Arc<Mutex<Task>>> {
        self.tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(QueueError::TaskNotFound(*id))
    }

    async fn update<F>(&self, id: &TaskId, apply: F) -> QueueResult<Task>
    where
        F: FnOnce(&mut Task, DateTime<Utc>) -> Result<(), TransitionError> + Send,
    {
        let entry = self.entry(id).await?;
        let mut task = entry.lock().await;
        apply(&mut *task, Utc::now())?;
        debug!(task_id = %id, status = %task.status, "Task updated");
        Ok(task.clone())
    }

    async fn snapshot(&self) -> Vec<Arc<Mutex<Task>>> {
        self.tasks.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, request: MergeRequest) -> QueueResult<Task> {
        let task = Task::new(request);
        self.tasks
            .write()
            .await
            .insert(task.id, Arc::new(Mutex::new(task.clone())));
        debug!(task_id = %task.id, "Task created");
        Ok(task)
    }

    async fn get(&self, id: &TaskId) -> QueueResult<Option<Task>> {
        let entry = self.tasks.read().await.get(id).cloned();
        match entry {
            Some(entry) => Ok(Some(entry.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn mark_running(&self, id: &TaskId) -> QueueResult<Task> {
        self.update(id, |task, now| task.start(now)).await
    }

    async fn mark_success(&self, id: &TaskId, output_ref: &str) -> QueueResult<Task> {
        let output_ref = output_ref.to_string();
        self.update(id, move |task, now| task.complete(output_ref, now)).await
    }

    async fn mark_failed(&self, id: &TaskId, error: &str) -> QueueResult<Task> {
        let error = error.to_string();
        self.update(id, move |task, now| task.fail(error, now)).await
    }

    async fn expired(&self, cutoff: DateTime<Utc>) -> QueueResult<Vec<Task>> {
        let mut expired = Vec::new();
        for entry in self.snapshot().await {
            let task = entry.lock().await;
            if task.is_terminal() && task.completed_at.is_some_and(|done| done <= cutoff) {
                expired.push(task.clone());
            }
        }
        Ok(expired)
    }

    async fn remove(&self, id: &TaskId) -> QueueResult<Option<Task>> {
        let removed = self.tasks.write().await.remove(id);
        match removed {
            Some(entry) => Ok(Some(entry.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn stats(&self) -> QueueResult<TaskStats> {
        let mut stats = TaskStats::default();
        for entry in self.snapshot().await {
            match entry.lock().await.status {
                TaskStatus::Queued => stats.queued += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Success => stats.success += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn references_output(&self, output_ref: &str) -> QueueResult<bool> {
        for entry in self.snapshot().await {
            if entry.lock().await.output_ref.as_deref() == Some(output_ref) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request() -> MergeRequest {
        MergeRequest::new("https://cdn.test/main.mp4", vec![], vec![])
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryTaskStore::new();
        let task = store.create(request()).await.unwrap();

        let fetched = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Queued);
        assert_eq!(fetched.created_at, fetched.updated_at);
        assert!(store.get(&TaskId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_success_transition() {
        let store = InMemoryTaskStore::new();
        let task = store.create(request()).await.unwrap();

        store.mark_running(&task.id).await.unwrap();
        let done = store.mark_success(&task.id, "a_composed.mp4").await.unwrap();

        assert_eq!(done.status, TaskStatus::Success);
        assert_eq!(done.output_ref.as_deref(), Some("a_composed.mp4"));
        assert!(done.error.is_none());
        assert!(done.completed_at.is_some());
        assert!(store.references_output("a_composed.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn test_fail_from_queued() {
        let store = InMemoryTaskStore::new();
        let task = store.create(request()).await.unwrap();

        let failed = store.mark_failed(&task.id, "Download failed: HTTP 404").await.unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert!(failed.output_ref.is_none());
    }

    #[tokio::test]
    async fn test_invalid_transitions_leave_task_unchanged() {
        let store = InMemoryTaskStore::new();
        let task = store.create(request()).await.unwrap();

        let err = store.mark_success(&task.id, "x").await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition(_)));

        store.mark_failed(&task.id, "boom").await.unwrap();
        let before = store.get(&task.id).await.unwrap().unwrap();

        tokio_test::assert_err!(store.mark_running(&task.id).await);
        tokio_test::assert_err!(store.mark_failed(&task.id, "again").await);

        let after = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(after.error.as_deref(), Some("boom"));
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let store = InMemoryTaskStore::new();
        let err = store.mark_running(&TaskId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_exactly_one_terminal_transition_under_race() {
        let store = Arc::new(InMemoryTaskStore::new());
        let task = store.create(request()).await.unwrap();
        store.mark_running(&task.id).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let id = task.id;
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    store.mark_success(&id, "out_composed.mp4").await.is_ok()
                } else {
                    store.mark_failed(&id, "err").await.is_ok()
                }
            }));
        }

        let mut wins = 0;
        for h in handles {
            if h.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);

        let t = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(t.output_ref.is_some(), t.status == TaskStatus::Success);
        assert_eq!(t.error.is_some(), t.status == TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_expired_and_remove() {
        let store = InMemoryTaskStore::new();
        let done = store.create(request()).await.unwrap();
        let pending = store.create(request()).await.unwrap();
        let finished = store.mark_failed(&done.id, "x").await.unwrap();
        let completed_at = finished.completed_at.unwrap();

        assert!(store.expired(completed_at - Duration::seconds(1)).await.unwrap().is_empty());

        let expired = store.expired(completed_at).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, done.id);

        assert!(store.remove(&done.id).await.unwrap().is_some());
        assert!(store.remove(&done.id).await.unwrap().is_none());
        assert!(store.get(&pending.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stats() {
        let store = InMemoryTaskStore::new();
        let a = store.create(request()).await.unwrap();
        let b = store.create(request()).await.unwrap();
        store.create(request()).await.unwrap();
        store.mark_running(&a.id).await.unwrap();
        store.mark_failed(&b.id, "x").await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(
            stats,
            TaskStats {
                queued: 1,
                running: 1,
                success: 0,
                failed: 1
            }
        );
        assert_eq!(stats.total(), 3);
    }
}
