//! Artifact download handler.

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::response::Response;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::error::ApiResult;
use crate::state::AppState;

/// `GET /video/:filename`
///
/// Streams a published artifact as `video/mp4`. Range requests and
/// conditional headers are handled by [`ServeFile`].
pub async fn get_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    let path = state.artifacts.resolve(&filename).await?;

    let response = match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    Ok(response.map(Body::new))
}

