use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use chosho_core::{JobId, process_batch};

use crate::models::{ErrorResponse, UploadResponse};
use crate::state::AppState;
use crate::upload;

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

pub async fn upload(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    let form = match upload::parse_multipart(multipart).await {
        Ok(form) => form,
        Err(e) => {
            tracing::warn!(error = %e, "rejected upload");
            return error(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    let job_id = form.job_id.unwrap_or_else(JobId::generate);
    tracing::info!(job_id = %job_id, files = form.files.len(), "upload received");

    let handle = state.registry.start(job_id.clone(), form.files.len());
    let result = process_batch(form.files, &state.pipeline, |event| handle.apply(&event)).await;
    handle.finish();

    let report = match result {
        Ok(report) => report,
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, format!("処理エラー: {e}")),
    };

    let csv = chosho_reporting::records_csv(&report.records);
    let aggregated_csv = chosho_reporting::aggregated_csv(&report.aggregated);
    match (csv, aggregated_csv) {
        (Ok(csv), Ok(aggregated_csv)) => {
            Json(UploadResponse::new(job_id, report, csv, aggregated_csv)).into_response()
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "CSV export failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, format!("処理エラー: {e}"))
        }
    }
}
