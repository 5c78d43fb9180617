//! Task submission and status handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use broll_models::{MergeRequest, TaskId, TaskStatusResponse, TaskSubmitResponse};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::services::submit_merge_task;
use crate::state::AppState;

/// `POST /tasks/merge-broll`
pub async fn submit_merge(
    State(state): State<AppState>,
    payload: Result<Json<MergeRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TaskSubmitResponse>)> {
    let result = match payload {
        Ok(Json(request)) => submit_merge_task(&state, request).await,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            Err(ApiError::payload_too_large(rejection.body_text()))
        }
        Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
    };

    match result {
        Ok(task) => Ok((StatusCode::ACCEPTED, Json(TaskSubmitResponse::queued(task.id)))),
        Err(e) => {
            metrics::record_task_rejected(e.status_code().as_u16());
            Err(e)
        }
    }
}

/// `GET /tasks/:task_id`
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskStatusResponse>> {
    let task_id: TaskId = task_id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid task id: {}", task_id)))?;

    let task = state
        .store
        .get(&task_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    Ok(Json(TaskStatusResponse::from_task(&task, &state.config.public_base_url)))
}
