use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Config, FailurePolicy};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api: Option<ApiConfig>,
    pub extraction: Option<ExtractionConfig>,
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub google_api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub render_dpi: Option<u32>,
    pub failure_policy: Option<FailurePolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: Option<u16>,
    pub max_upload_mb: Option<u32>,
    pub upload_dir: Option<String>,
}

/// Platform config directory path: `<config_dir>/chosho/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chosho").join("config.toml"))
}

/// Load config by cascading CWD `.chosho.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".chosho.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

fn pick<S, T: Clone>(
    base: &Option<S>,
    overlay: &Option<S>,
    field: impl Fn(&S) -> Option<T>,
) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        api: Some(ApiConfig {
            google_api_key: pick(&base.api, &overlay.api, |a| a.google_api_key.clone()),
            model: pick(&base.api, &overlay.api, |a| a.model.clone()),
            base_url: pick(&base.api, &overlay.api, |a| a.base_url.clone()),
            request_timeout_secs: pick(&base.api, &overlay.api, |a| a.request_timeout_secs),
        }),
        extraction: Some(ExtractionConfig {
            render_dpi: pick(&base.extraction, &overlay.extraction, |e| e.render_dpi),
            failure_policy: pick(&base.extraction, &overlay.extraction, |e| e.failure_policy),
        }),
        server: Some(ServerConfig {
            port: pick(&base.server, &overlay.server, |s| s.port),
            max_upload_mb: pick(&base.server, &overlay.server, |s| s.max_upload_mb),
            upload_dir: pick(&base.server, &overlay.server, |s| s.upload_dir.clone()),
        }),
    }
}

/// Build a [`Config`] from a config file plus the process environment.
///
/// Environment variables win over file values: `GOOGLE_API_KEY`,
/// `GEMINI_MODEL`, `PORT` and `CHOSHO_UPLOAD_DIR`.
pub fn resolve(file: &ConfigFile) -> Config {
    resolve_with(file, |name| std::env::var(name).ok())
}

/// [`resolve`] with an injectable environment lookup.
pub fn resolve_with(file: &ConfigFile, env: impl Fn(&str) -> Option<String>) -> Config {
    let env = |name: &str| env(name).filter(|v| !v.trim().is_empty());
    let mut config = Config::default();

    if let Some(api) = &file.api {
        if let Some(key) = &api.google_api_key {
            config.google_api_key = Some(key.clone());
        }
        if let Some(model) = &api.model {
            config.model = model.clone();
        }
        if let Some(url) = &api.base_url {
            config.api_base_url = url.clone();
        }
        if let Some(secs) = api.request_timeout_secs {
            config.request_timeout_secs = secs;
        }
    }
    if let Some(extraction) = &file.extraction {
        if let Some(dpi) = extraction.render_dpi {
            config.render_dpi = dpi;
        }
        if let Some(policy) = extraction.failure_policy {
            config.failure_policy = policy;
        }
    }
    if let Some(server) = &file.server {
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(mb) = server.max_upload_mb {
            config.max_upload_mb = mb;
        }
        if let Some(dir) = &server.upload_dir {
            config.upload_dir = PathBuf::from(dir);
        }
    }

    if let Some(key) = env("GOOGLE_API_KEY") {
        config.google_api_key = Some(key);
    }
    if let Some(model) = env("GEMINI_MODEL") {
        config.model = model;
    }
    if let Some(port) = env("PORT") {
        match port.trim().parse() {
            Ok(port) => config.port = port,
            Err(_) => tracing::warn!(value = %port, "ignoring invalid PORT"),
        }
    }
    if let Some(dir) = env("CHOSHO_UPLOAD_DIR") {
        config.upload_dir = PathBuf::from(dir);
    }

    config
}
