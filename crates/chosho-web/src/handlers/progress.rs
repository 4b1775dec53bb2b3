use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use chosho_core::{JobId, ProgressSnapshot};

use crate::models::{ErrorResponse, ProgressQuery, ProgressResponse};
use crate::state::AppState;

/// Snapshot for `job_id`, or for the most recently started job when no id
/// is given (all zeros before any upload).
pub async fn progress(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProgressQuery>,
) -> Response {
    match query.job_id.filter(|id| !id.is_empty()) {
        Some(id) => {
            let job_id = JobId::from(id);
            match state.registry.snapshot(&job_id) {
                Some(progress) => Json(ProgressResponse {
                    job_id: Some(job_id),
                    progress,
                })
                .into_response(),
                None => (
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse {
                        error: format!("unknown job: {job_id}"),
                    }),
                )
                    .into_response(),
            }
        }
        None => {
            let response = match state.registry.latest() {
                Some((job_id, progress)) => ProgressResponse {
                    job_id: Some(job_id),
                    progress,
                },
                None => ProgressResponse {
                    job_id: None,
                    progress: ProgressSnapshot::default(),
                },
            };
            Json(response).into_response()
        }
    }
}
