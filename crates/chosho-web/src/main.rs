use std::net::SocketAddr;
use std::sync::Arc;

use chosho_core::config_file;
use chosho_ingest::DocumentRasterizer;
use chosho_web::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config_file::resolve(&config_file::load_config());
    if !config.has_api_key() {
        tracing::warn!("GOOGLE_API_KEY is not set; every page will report extraction as unavailable");
    }

    match std::fs::create_dir_all(&config.upload_dir) {
        Ok(()) => tracing::info!(path = %config.upload_dir.display(), "upload directory ready"),
        Err(e) => {
            tracing::error!(path = %config.upload_dir.display(), error = %e, "failed to create upload directory")
        }
    }

    let rasterizer = Arc::new(DocumentRasterizer::new().with_dpi(config.render_dpi));
    let port = config.port;
    let state = Arc::new(AppState::new(config, rasterizer));
    let app = chosho_web::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
