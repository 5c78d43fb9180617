//! Task intake.
//!
//! A submission is checked locally, then every source is probed
//! concurrently. Only when all checks pass is a task created and queued;
//! a rejected submission leaves no trace in the store.

use tracing::{info, warn};

use broll_media::probe_total_size;
use broll_models::{validate_request, MergeRequest, Task, ValidationError};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Validate, probe, create and enqueue a merge task.
pub async fn submit_merge_task(state: &AppState, request: MergeRequest) -> ApiResult<Task> {
    validate_request(&request)?;

    let urls: Vec<String> = request.source_urls().map(str::to_string).collect();
    match probe_total_size(state.probe.as_ref(), &urls, state.max_total_bytes).await {
        Ok(total) => {
            info!(sources = urls.len(), total_bytes = total, "Sources probed");
        }
        Err(e) if e.is_size_limit() => {
            warn!("Submission rejected: {}", e);
            return Err(ApiError::payload_too_large(e.to_string()));
        }
        Err(e) => {
            let url = e.url().unwrap_or_default().to_string();
            warn!(url = %url, "Submission rejected: {}", e);
            return Err(ValidationError::unreachable(url, e.reason()).into());
        }
    }

    let task = state.store.create(request).await?;
    if let Err(e) = state.queue.enqueue(task.id) {
        // Nothing will ever run this task, so it must not be observable.
        state.store.remove(&task.id).await?;
        warn!(task_id = %task.id, "Submission rejected: {}", e);
        return Err(ApiError::service_unavailable(e.to_string()));
    }

    metrics::record_task_submitted();
    metrics::set_queue_length(state.queue.len());
    info!(task_id = %task.id, "Task queued");
    Ok(task)
}
