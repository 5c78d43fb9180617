//! Task bookkeeping for the merge service.
//!
//! This crate provides:
//! - The [`TaskStore`] trait and an in-memory implementation with
//!   per-task atomic updates
//! - A bounded FIFO [`TaskQueue`] feeding the worker pool

pub mod error;
pub mod queue;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use queue::{QueueConfig, TaskQueue};
pub use store::{InMemoryTaskStore, TaskStats, TaskStore};
