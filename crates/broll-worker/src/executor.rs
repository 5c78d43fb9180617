//! Task executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use broll_queue::TaskQueue;

use crate::error::{WorkerError, WorkerResult};
use crate::processor::{process_task, ProcessingContext};

/// Worker pool draining the task queue.
///
/// At most `max_concurrent_tasks` tasks are processed at once. A permit is
/// taken before a task id is dequeued, so ids stay in the queue (and count
/// towards its length) until a worker is actually free.
pub struct TaskExecutor {
    ctx: Arc<ProcessingContext>,
    queue: Arc<TaskQueue>,
    task_semaphore: Arc<Semaphore>,
    max_concurrent_tasks: usize,
    shutdown: watch::Sender<bool>,
}

impl TaskExecutor {
    pub fn new(ctx: Arc<ProcessingContext>, queue: Arc<TaskQueue>) -> Self {
        let max_concurrent_tasks = ctx.config.max_concurrent_tasks.max(1);
        let (shutdown, _) = watch::channel(false);

        Self {
            ctx,
            queue,
            task_semaphore: Arc::new(Semaphore::new(max_concurrent_tasks)),
            max_concurrent_tasks,
            shutdown,
        }
    }

    /// Run until [`shutdown`](Self::shutdown) is called or the queue closes,
    /// then wait (bounded by the shutdown timeout) for in-flight tasks.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting task executor with {} max concurrent tasks",
            self.max_concurrent_tasks
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                info!("Shutdown signal received, stopping executor");
                break;
            }

            let permit = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                permit = self.task_semaphore.clone().acquire_owned() => {
                    permit.map_err(|_| WorkerError::internal("Semaphore closed"))?
                }
            };

            let task_id = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                next = self.queue.dequeue() => match next {
                    Some(id) => id,
                    None => {
                        info!("Task queue closed, stopping executor");
                        break;
                    }
                },
            };

            debug!(task_id = %task_id, "Dispatching task");
            let ctx = Arc::clone(&self.ctx);
            tokio::spawn(async move {
                let _permit = permit;
                // Outcome is already logged and recorded on the task.
                let _ = process_task(&ctx, task_id).await;
            });
        }

        info!("Waiting for in-flight tasks to complete...");
        let shutdown_timeout = self.ctx.config.shutdown_timeout;
        if tokio::time::timeout(shutdown_timeout, self.wait_for_tasks()).await.is_err() {
            warn!(
                "In-flight tasks still running after {}s, abandoning them",
                shutdown_timeout.as_secs()
            );
        }

        info!("Task executor stopped");
        Ok(())
    }

    /// Number of tasks currently being processed.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent_tasks - self.task_semaphore.available_permits()
    }

    /// Wait for all in-flight tasks to complete.
    async fn wait_for_tasks(&self) {
        loop {
            if self.task_semaphore.available_permits() == self.max_concurrent_tasks {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
