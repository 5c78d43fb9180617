//! In-process FIFO task queue.

use tokio::sync::{mpsc, watch, Mutex};
use tracing::debug;

use broll_models::TaskId;

use crate::error::{QueueError, QueueResult};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of tasks waiting for a worker
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// Bounded multi-producer queue of task ids with a single consumer.
///
/// Closing goes through a watch flag rather than the receiver, so it never
/// waits on a consumer parked in [`dequeue`](TaskQueue::dequeue).
pub struct TaskQueue {
    tx: mpsc::Sender<TaskId>,
    rx: Mutex<mpsc::Receiver<TaskId>>,
    closed: watch::Sender<bool>,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(config: QueueConfig) -> Self {
        let capacity = config.capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let (closed, _) = watch::channel(false);
        Self {
            tx,
            rx: Mutex::new(rx),
            closed,
            capacity,
        }
    }

    /// Enqueue without waiting. Fails when the queue is full.
    pub fn enqueue(&self, id: TaskId) -> QueueResult<()> {
        if self.is_closed() {
            return Err(QueueError::QueueClosed);
        }
        self.tx.try_send(id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::QueueFull {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => QueueError::QueueClosed,
        })?;
        debug!(task_id = %id, pending = self.len(), "Task enqueued");
        Ok(())
    }

    /// Wait for the next task id. Returns `None` once the queue is closed
    /// and drained.
    pub async fn dequeue(&self) -> Option<TaskId> {
        let mut closed = self.closed.subscribe();
        let mut rx = self.rx.lock().await;

        if *closed.borrow() {
            return rx.try_recv().ok();
        }

        tokio::select! {
            biased;
            next = rx.recv() => next,
            _ = closed.wait_for(|c| *c) => rx.try_recv().ok(),
        }
    }

    /// Stop accepting new tasks. Already queued ids can still be dequeued,
    /// and a consumer waiting on an empty queue is woken with `None`.
    pub fn close(&self) {
        if !self.closed.send_replace(true) {
            debug!(pending = self.len(), "Task queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Number of tasks waiting for a worker.
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order_and_length() {
        let queue = TaskQueue::new(QueueConfig { capacity: 8 });
        let ids: Vec<TaskId> = (0..3).map(|_| TaskId::new()).collect();
        for id in &ids {
            queue.enqueue(*id).unwrap();
        }
        assert_eq!(queue.len(), 3);

        for id in &ids {
            assert_eq!(queue.dequeue().await, Some(*id));
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let queue = TaskQueue::new(QueueConfig { capacity: 1 });
        queue.enqueue(TaskId::new()).unwrap();
        let err = queue.enqueue(TaskId::new()).unwrap_err();
        assert!(matches!(err, QueueError::QueueFull { capacity: 1 }));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = TaskQueue::new(QueueConfig::default());
        let id = TaskId::new();
        queue.enqueue(id).unwrap();
        queue.close();

        assert!(matches!(queue.enqueue(TaskId::new()), Err(QueueError::QueueClosed)));
        assert_eq!(queue.dequeue().await, Some(id));
        assert_eq!(queue.dequeue().await, None);
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_consumer() {
        let queue = std::sync::Arc::new(TaskQueue::new(QueueConfig::default()));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        queue.close();

        let next = tokio::time::timeout(std::time::Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next, None);
        assert!(queue.is_closed());
    }
}
