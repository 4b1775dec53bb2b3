use axum::Json;
use axum::extract::State;
use std::sync::Arc;

use crate::models::HealthResponse;
use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config = &state.config;
    // Heroku sets DYNO on every dyno.
    let environment = if std::env::var_os("DYNO").is_some() {
        "Heroku"
    } else {
        "Local/Cloud Run"
    };

    Json(HealthResponse {
        status: "healthy",
        environment,
        version: env!("CARGO_PKG_VERSION"),
        api_key_configured: config.has_api_key(),
        model: config.model.clone(),
        upload_dir: config.upload_dir.display().to_string(),
        upload_dir_exists: config.upload_dir.is_dir(),
        temp_dir: std::env::temp_dir().display().to_string(),
        current_dir: std::env::current_dir()
            .ok()
            .map(|dir| dir.display().to_string()),
        port: config.port,
        timestamp: chrono::Local::now().to_rfc3339(),
    })
}
