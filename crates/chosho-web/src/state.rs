use std::sync::Arc;

use chosho_core::{Config, PipelineContext, ProgressRegistry, Rasterizer};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub config: Config,
    pub registry: Arc<ProgressRegistry>,
    pub pipeline: PipelineContext,
}

impl AppState {
    /// Wire the pipeline from `config`. The Gemini backend is only built
    /// when an API key is configured.
    pub fn new(config: Config, rasterizer: Arc<dyn Rasterizer>) -> Self {
        let pipeline = PipelineContext::from_config(&config, rasterizer);
        Self {
            config,
            registry: Arc::new(ProgressRegistry::default()),
            pipeline,
        }
    }
}
