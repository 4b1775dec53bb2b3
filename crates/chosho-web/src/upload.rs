use axum::extract::Multipart;
use thiserror::Error;

use chosho_core::{InputFile, JobId};

/// Parsed form fields from the multipart upload.
#[derive(Debug)]
pub struct UploadForm {
    /// Every `file` part in submission order.
    pub files: Vec<InputFile>,
    /// Client-chosen id for progress polling, if supplied.
    pub job_id: Option<JobId>,
}

/// Rejections that map to 400 responses.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("ファイルがありません")]
    NoFileField,
    #[error("ファイルが選択されていません")]
    NoFileSelected,
    #[error("フォームの読み込みに失敗しました: {0}")]
    Malformed(String),
}

/// Parse a multipart form upload into structured form fields.
///
/// Only the first file's name is validated; later files with unusable
/// names are left for the pipeline to skip.
pub async fn parse_multipart(mut multipart: Multipart) -> Result<UploadForm, UploadError> {
    let mut files: Vec<InputFile> = Vec::new();
    let mut job_id: Option<JobId> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Malformed(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| UploadError::Malformed(e.to_string()))?
                    .to_vec();
                files.push(InputFile::from_bytes(filename, data));
            }
            "job_id" => {
                let val = field
                    .text()
                    .await
                    .map_err(|e| UploadError::Malformed(e.to_string()))?;
                let val = val.trim();
                if !val.is_empty() {
                    job_id = Some(JobId::from(val));
                }
            }
            _ => {
                // Ignore unknown fields
                let _ = field.bytes().await;
            }
        }
    }

    match files.first() {
        None => Err(UploadError::NoFileField),
        Some(first) if first.filename.is_empty() => Err(UploadError::NoFileSelected),
        Some(_) => Ok(UploadForm { files, job_id }),
    }
}
