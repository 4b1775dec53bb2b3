use serde::{Deserialize, Serialize};

use chosho_core::{
    AggregatedRecord, BatchReport, FileFailure, JobId, PageError, ProgressSnapshot, Record,
};

// ── Upload ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub job_id: JobId,
    pub records: Vec<Record>,
    pub aggregated: Vec<AggregatedRecord>,
    pub csv: String,
    pub aggregated_csv: String,
    pub processed_files: usize,
    pub skipped_files: Vec<String>,
    pub failed_files: Vec<FileFailure>,
    pub page_errors: Vec<PageError>,
}

impl UploadResponse {
    pub fn new(job_id: JobId, report: BatchReport, csv: String, aggregated_csv: String) -> Self {
        Self {
            job_id,
            records: report.records,
            aggregated: report.aggregated,
            csv,
            aggregated_csv,
            processed_files: report.processed_files,
            skipped_files: report.skipped_files,
            failed_files: report.failed_files,
            page_errors: report.page_errors,
        }
    }
}

// ── Progress ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub job_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    /// `None` when no job has been started yet.
    pub job_id: Option<JobId>,
    #[serde(flatten)]
    pub progress: ProgressSnapshot,
}

// ── Health ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub environment: &'static str,
    pub version: &'static str,
    pub api_key_configured: bool,
    pub model: String,
    pub upload_dir: String,
    pub upload_dir_exists: bool,
    pub temp_dir: String,
    pub current_dir: Option<String>,
    pub port: u16,
    pub timestamp: String,
}

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
