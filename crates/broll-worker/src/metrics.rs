//! Task processing metrics.
//!
//! These only emit when a recorder is installed (the API binary installs
//! the Prometheus one); otherwise every call is a no-op.

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const TASKS_STARTED_TOTAL: &str = "broll_tasks_started_total";
    pub const TASKS_COMPLETED_TOTAL: &str = "broll_tasks_completed_total";
    pub const TASKS_FAILED_TOTAL: &str = "broll_tasks_failed_total";
    pub const TASKS_IN_FLIGHT: &str = "broll_tasks_in_flight";
    pub const TASK_DURATION_SECONDS: &str = "broll_task_duration_seconds";
    pub const DOWNLOAD_DURATION_SECONDS: &str = "broll_download_duration_seconds";
    pub const RENDER_DURATION_SECONDS: &str = "broll_render_duration_seconds";
    pub const REAPED_TASKS_TOTAL: &str = "broll_reaped_tasks_total";
    pub const REAPED_ARTIFACTS_TOTAL: &str = "broll_reaped_artifacts_total";
}

pub fn record_task_started() {
    counter!(names::TASKS_STARTED_TOTAL).increment(1);
    gauge!(names::TASKS_IN_FLIGHT).increment(1.0);
}

pub fn record_task_completed(duration_secs: f64) {
    counter!(names::TASKS_COMPLETED_TOTAL).increment(1);
    gauge!(names::TASKS_IN_FLIGHT).decrement(1.0);
    histogram!(names::TASK_DURATION_SECONDS).record(duration_secs);
}

/// Record a failed task, labelled with the failing stage.
pub fn record_task_failed(kind: &'static str, duration_secs: f64) {
    counter!(names::TASKS_FAILED_TOTAL, "kind" => kind).increment(1);
    gauge!(names::TASKS_IN_FLIGHT).decrement(1.0);
    histogram!(names::TASK_DURATION_SECONDS).record(duration_secs);
}

pub fn record_download_duration(duration_secs: f64) {
    histogram!(names::DOWNLOAD_DURATION_SECONDS).record(duration_secs);
}

pub fn record_render_duration(duration_secs: f64) {
    histogram!(names::RENDER_DURATION_SECONDS).record(duration_secs);
}

pub fn record_reaped(tasks: usize, artifacts: usize) {
    counter!(names::REAPED_TASKS_TOTAL).increment(tasks as u64);
    counter!(names::REAPED_ARTIFACTS_TOTAL).increment(artifacts as u64);
}
