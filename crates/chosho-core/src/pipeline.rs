//! The batch loop: classify, rasterize, extract, accumulate, aggregate.
//!
//! Files and pages are processed strictly in order on the calling task.
//! Page-level extraction failures are recorded and never stop the batch;
//! file-level failures follow the configured [`FailurePolicy`].

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::aggregate::aggregate;
use crate::extract::{ExtractionBackend, GeminiBackend, extract_page};
use crate::progress::ProgressEvent;
use crate::raster::{FileKind, PageImage, RasterizeError, Rasterizer};
use crate::{AggregatedRecord, Config, FailurePolicy, Record};

/// Where an input file's bytes live.
#[derive(Debug, Clone)]
pub enum InputSource {
    /// Uploaded content, spilled to a temp file for the rasterizer.
    Bytes(Vec<u8>),
    /// A file already on disk; read in place.
    Path(PathBuf),
}

/// One file of a batch.
#[derive(Debug, Clone)]
pub struct InputFile {
    /// Name as supplied by the client; only used for classification and reporting.
    pub filename: String,
    pub source: InputSource,
}

impl InputFile {
    pub fn from_bytes(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            source: InputSource::Bytes(data),
        }
    }

    /// Use the path's file name as the display name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            filename,
            source: InputSource::Path(path),
        }
    }
}

/// Collaborators and settings for [`process_batch`].
#[derive(Clone)]
pub struct PipelineContext {
    pub rasterizer: Arc<dyn Rasterizer>,
    /// `None` when no API key is configured; every page then records
    /// a capability-unavailable error.
    pub backend: Option<Arc<dyn ExtractionBackend>>,
    pub upload_dir: PathBuf,
    pub failure_policy: FailurePolicy,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("upload_dir", &self.upload_dir)
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}

impl PipelineContext {
    /// Wire a rasterizer to the Gemini backend described by `config`.
    pub fn from_config(config: &Config, rasterizer: Arc<dyn Rasterizer>) -> Self {
        let backend = GeminiBackend::from_config(config)
            .map(|b| Arc::new(b) as Arc<dyn ExtractionBackend>);
        Self {
            rasterizer,
            backend,
            upload_dir: config.upload_dir.clone(),
            failure_policy: config.failure_policy,
        }
    }
}

/// A file that could not be processed (only under [`FailurePolicy::Skip`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub filename: String,
    pub error: String,
}

/// A page whose extraction failed; it contributed no records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageError {
    pub filename: String,
    pub page: usize,
    pub error: String,
}

/// Everything a batch produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub records: Vec<Record>,
    pub aggregated: Vec<AggregatedRecord>,
    /// Files that were rasterized and had every page sent for extraction.
    pub processed_files: usize,
    /// Files ignored because of their extension.
    pub skipped_files: Vec<String>,
    pub failed_files: Vec<FileFailure>,
    pub page_errors: Vec<PageError>,
}

#[derive(Error, Debug)]
pub enum FileError {
    #[error(transparent)]
    Rasterize(#[from] RasterizeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("rasterization task failed: {0}")]
    Join(String),
}

#[derive(Error, Debug)]
pub enum BatchError {
    /// A file failed under [`FailurePolicy::Abort`]; earlier results are discarded.
    #[error("{filename}: {source}")]
    Processing {
        filename: String,
        #[source]
        source: FileError,
    },
}

/// Process every file of a batch in order and aggregate the results.
pub async fn process_batch(
    files: Vec<InputFile>,
    ctx: &PipelineContext,
    progress: impl Fn(ProgressEvent) + Send + Sync,
) -> Result<BatchReport, BatchError> {
    let total = files.len();
    let mut report = BatchReport::default();

    for (file_index, file) in files.into_iter().enumerate() {
        progress(ProgressEvent::FileStarted {
            file_index,
            total,
            filename: file.filename.clone(),
        });

        let Some(kind) = FileKind::from_filename(&file.filename) else {
            tracing::warn!(filename = %file.filename, "skipping unsupported file type");
            progress(ProgressEvent::FileSkipped {
                filename: file.filename.clone(),
            });
            report.skipped_files.push(file.filename);
            continue;
        };

        match process_file(&file, kind, ctx, &progress, &mut report).await {
            Ok(()) => report.processed_files += 1,
            Err(e) => match ctx.failure_policy {
                FailurePolicy::Abort => {
                    tracing::error!(filename = %file.filename, error = %e, "aborting batch");
                    return Err(BatchError::Processing {
                        filename: file.filename,
                        source: e,
                    });
                }
                FailurePolicy::Skip => {
                    tracing::warn!(filename = %file.filename, error = %e, "skipping file that failed to process");
                    report.failed_files.push(FileFailure {
                        filename: file.filename,
                        error: e.to_string(),
                    });
                }
            },
        }
    }

    report.aggregated = aggregate(&report.records);
    tracing::info!(
        files = total,
        processed = report.processed_files,
        records = report.records.len(),
        groups = report.aggregated.len(),
        "batch complete"
    );
    Ok(report)
}

async fn process_file(
    file: &InputFile,
    kind: FileKind,
    ctx: &PipelineContext,
    progress: &(dyn Fn(ProgressEvent) + Send + Sync),
    report: &mut BatchReport,
) -> Result<(), FileError> {
    let pages = rasterize_input(file, kind, ctx).await?;
    let total_pages = pages.len();
    progress(ProgressEvent::PagesCounted { total: total_pages });

    for page in pages {
        progress(ProgressEvent::PageStarted {
            page: page.page_number,
            total: total_pages,
        });
        tracing::info!(
            filename = %file.filename,
            page = page.page_number,
            total_pages,
            "extracting page"
        );

        let extraction = extract_page(ctx.backend.as_deref(), &page).await;
        if let Some(err) = extraction.error {
            let message = err.to_string();
            tracing::warn!(filename = %file.filename, page = page.page_number, error = %message, "page extraction failed");
            progress(ProgressEvent::PageFailed {
                page: page.page_number,
                message: message.clone(),
            });
            report.page_errors.push(PageError {
                filename: file.filename.clone(),
                page: page.page_number,
                error: message,
            });
        }
        report.records.extend(extraction.records);
    }

    Ok(())
}

/// Rasterize on the blocking pool. Byte sources are spilled to a temp file
/// that lives until this function returns, on success or failure.
async fn rasterize_input(
    file: &InputFile,
    kind: FileKind,
    ctx: &PipelineContext,
) -> Result<Vec<PageImage>, FileError> {
    let (_temp, path) = match &file.source {
        InputSource::Path(path) => (None, path.clone()),
        InputSource::Bytes(data) => {
            let temp = spill_to_temp(data, kind, &ctx.upload_dir)?;
            let path = temp.path().to_path_buf();
            (Some(temp), path)
        }
    };

    let rasterizer = Arc::clone(&ctx.rasterizer);
    tokio::task::spawn_blocking(move || rasterizer.rasterize(&path, kind))
        .await
        .map_err(|e| FileError::Join(e.to_string()))?
        .map_err(FileError::from)
}

fn spill_to_temp(
    data: &[u8],
    kind: FileKind,
    dir: &Path,
) -> std::io::Result<tempfile::NamedTempFile> {
    std::fs::create_dir_all(dir)?;
    let mut temp = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(kind.suffix())
        .tempfile_in(dir)?;
    temp.write_all(data)?;
    temp.flush()?;
    Ok(temp)
}
