//! B-roll merge worker.
//!
//! This crate provides:
//! - The per-task processing pipeline (fetch, inspect, plan, render, publish)
//! - A bounded worker pool draining the task queue
//! - The retention reaper for artifacts and task records
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod reaper;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::TaskExecutor;
pub use logging::TaskLogger;
pub use processor::{process_task, ProcessingContext};
pub use reaper::{ReapReport, Reaper};
