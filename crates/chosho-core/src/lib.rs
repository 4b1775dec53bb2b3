use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub mod aggregate;
pub mod config_file;
pub mod extract;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod raster;

// Re-export for convenience
pub use aggregate::{AggregationKey, aggregate};
pub use extract::{ExtractionBackend, ExtractionError, PageExtraction, extract_page};
pub use normalize::{normalize, normalize_all};
pub use pipeline::{
    BatchError, BatchReport, FileError, FileFailure, InputFile, InputSource, PageError,
    PipelineContext, process_batch,
};
pub use progress::{JobId, ProgressEvent, ProgressHandle, ProgressRegistry, ProgressSnapshot};
pub use raster::{FileKind, PageImage, RasterizeError, Rasterizer};

/// A line item as returned by the extraction model, before normalization.
///
/// Every field is optional on the wire. Text fields collapse to `""` when
/// absent or null; amounts stay `None` until [`normalize`] fills them in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawRecord {
    #[serde(default, deserialize_with = "normalize::deserialize_text")]
    pub category: String,
    #[serde(default, deserialize_with = "normalize::deserialize_text")]
    pub detail: String,
    #[serde(default, deserialize_with = "normalize::deserialize_amount")]
    pub payment_amount: Option<i64>,
    #[serde(default, deserialize_with = "normalize::deserialize_amount")]
    pub withholding_tax: Option<i64>,
    #[serde(default, deserialize_with = "normalize::deserialize_text")]
    pub payer_address: String,
    #[serde(default, deserialize_with = "normalize::deserialize_text")]
    pub payer_name: String,
    #[serde(default, deserialize_with = "normalize::deserialize_text")]
    pub payer_tel: String,
}

/// A normalized line item: both amounts are always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub category: String,
    pub detail: String,
    pub payment_amount: i64,
    pub withholding_tax: i64,
    pub payer_address: String,
    pub payer_name: String,
    pub payer_tel: String,
}

/// Records sharing an [`AggregationKey`], summed.
///
/// Address, name and telephone come from the first record seen for the key
/// and are never overwritten by later records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    pub category: String,
    pub detail: String,
    pub payment_amount: i64,
    pub withholding_tax: i64,
    pub payer_address: String,
    pub payer_name: String,
    pub payer_tel: String,
    pub count: usize,
}

/// What to do when a whole file cannot be processed (corrupt PDF, unreadable image).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Fail the whole batch and discard results from earlier files.
    #[default]
    Abort,
    /// Record the failure and continue with the next file.
    Skip,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown failure policy: {other} (expected abort or skip)")),
        }
    }
}

/// Default upload cap, matching the 16 MB limit of the hosted deployment.
pub const DEFAULT_MAX_UPLOAD_MB: u32 = 16;
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_RENDER_DPI: u32 = 200;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Runtime configuration shared by the server and the CLI.
#[derive(Clone)]
pub struct Config {
    pub google_api_key: Option<String>,
    pub model: String,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    /// Resolution PDF pages are rendered at before extraction.
    pub render_dpi: u32,
    pub failure_policy: FailurePolicy,
    /// Directory uploaded bytes are spilled into while a file is processed.
    pub upload_dir: PathBuf,
    pub max_upload_mb: u32,
    pub port: u16,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "google_api_key",
                &self.google_api_key.as_ref().map(|_| "***"),
            )
            .field("model", &self.model)
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("render_dpi", &self.render_dpi)
            .field("failure_policy", &self.failure_policy)
            .field("upload_dir", &self.upload_dir)
            .field("max_upload_mb", &self.max_upload_mb)
            .field("port", &self.port)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            google_api_key: None,
            model: extract::gemini::DEFAULT_MODEL.to_string(),
            api_base_url: extract::gemini::GEMINI_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            render_dpi: DEFAULT_RENDER_DPI,
            failure_policy: FailurePolicy::Abort,
            upload_dir: default_upload_dir(),
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Whether an extraction backend can be built from this config.
    pub fn has_api_key(&self) -> bool {
        self.google_api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb as usize * 1024 * 1024
    }
}

/// `<tmp>/payment_statement_uploads`
pub fn default_upload_dir() -> PathBuf {
    std::env::temp_dir().join("payment_statement_uploads")
}
