//! Extraction of line items from page images via a multimodal model.

pub mod gemini;
pub mod mock;
pub mod parse;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::normalize::normalize_all;
use crate::raster::PageImage;
use crate::Record;

pub use gemini::GeminiBackend;
pub use parse::{ParseFailure, parse_response};

/// Instruction sent alongside every page image.
pub const EXTRACTION_PROMPT: &str = r#"これは日本の支払調書です。以下の情報を抽出してください：
1. 区分
2. 細目
3. 支払金額
4. 源泉徴収税額
5. 支払者の所在地
6. 支払者の名称
7. 支払者の電話番号

支払者の情報は通常、支払調書の下側に配置されています。

結果はJSON形式で返してください。複数の支払調書データがある場合は配列形式で返してください。

例：
{
    "records": [
        {
            "category": "報酬・料金・契約金及び賞金の支払調書",
            "detail": "原稿料",
            "payment_amount": 100000,
            "withholding_tax": 10210,
            "payer_address": "東京都千代田区丸の内1-1-1",
            "payer_name": "株式会社サンプル",
            "payer_tel": "03-1234-5678"
        }
    ]
}
"#;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("extraction capability unavailable: GOOGLE_API_KEY is not set")]
    CapabilityUnavailable,
    #[error("HTTP request error: {0}")]
    Http(String),
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("model returned no text")]
    EmptyResponse,
    #[error("could not read records from model response: {0}")]
    Parse(#[from] ParseFailure),
}

/// A multimodal model that answers a prompt about one page image.
pub trait ExtractionBackend: Send + Sync {
    /// Short name for logs (e.g. "Gemini").
    fn name(&self) -> &str;

    /// Send the prompt and the page, returning the model's free text.
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        page: &'a PageImage,
    ) -> Pin<Box<dyn Future<Output = Result<String, ExtractionError>> + Send + 'a>>;
}

/// Outcome of extracting one page. Failures never propagate: they leave
/// `records` empty and describe themselves in `error`.
#[derive(Debug, Default)]
pub struct PageExtraction {
    pub records: Vec<Record>,
    pub error: Option<ExtractionError>,
}

impl PageExtraction {
    fn failed(error: ExtractionError) -> Self {
        Self {
            records: Vec::new(),
            error: Some(error),
        }
    }
}

/// Extract and normalize the records on one page.
///
/// With no backend configured this returns
/// [`ExtractionError::CapabilityUnavailable`] without any network traffic.
pub async fn extract_page(
    backend: Option<&dyn ExtractionBackend>,
    page: &PageImage,
) -> PageExtraction {
    let Some(backend) = backend else {
        return PageExtraction::failed(ExtractionError::CapabilityUnavailable);
    };

    let text = match backend.generate(EXTRACTION_PROMPT, page).await {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(backend = backend.name(), page = page.page_number, error = %e, "generate failed");
            return PageExtraction::failed(e);
        }
    };

    match parse_response(&text) {
        Ok(raw) => PageExtraction {
            records: normalize_all(raw),
            error: None,
        },
        Err(failure) => {
            tracing::debug!(page = page.page_number, response = %text, "unparseable model response");
            PageExtraction::failed(failure.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockBackend, MockResponse};
    use super::*;

    fn page() -> PageImage {
        PageImage {
            page_number: 1,
            png: vec![0x89, b'P', b'N', b'G'],
            width: 1,
            height: 1,
        }
    }

    #[test]
    fn prompt_names_every_field() {
        for field in [
            "category",
            "detail",
            "payment_amount",
            "withholding_tax",
            "payer_address",
            "payer_name",
            "payer_tel",
            "\"records\"",
        ] {
            assert!(EXTRACTION_PROMPT.contains(field), "missing {field}");
        }
    }

    #[tokio::test]
    async fn no_backend_is_capability_unavailable() {
        let out = extract_page(None, &page()).await;
        assert!(out.records.is_empty());
        assert!(matches!(out.error, Some(ExtractionError::CapabilityUnavailable)));
    }

    #[tokio::test]
    async fn fenced_empty_records_is_clean() {
        let backend = MockBackend::new(MockResponse::Text("```json\n{\"records\": []}\n```".into()));
        let out = extract_page(Some(&backend), &page()).await;
        assert!(out.records.is_empty());
        assert!(out.error.is_none());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn invalid_json_yields_error_and_no_records() {
        let backend = MockBackend::new(MockResponse::Text("I could not read this page.".into()));
        let out = extract_page(Some(&backend), &page()).await;
        assert!(out.records.is_empty());
        let err = out.error.expect("error should be populated");
        assert!(matches!(err, ExtractionError::Parse(_)));
        assert!(!err.to_string().is_empty());
    }

    #[tokio::test]
    async fn records_are_normalized() {
        let backend = MockBackend::new(MockResponse::Text(
            r#"{"records": [{"payer_name": "A", "payment_amount": 500}]}"#.into(),
        ));
        let out = extract_page(Some(&backend), &page()).await;
        assert!(out.error.is_none());
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].payment_amount, 500);
        assert_eq!(out.records[0].withholding_tax, 0);
    }

    #[tokio::test]
    async fn backend_error_is_absorbed() {
        let backend = MockBackend::new(MockResponse::Error("connection reset".into()));
        let out = extract_page(Some(&backend), &page()).await;
        assert!(out.records.is_empty());
        assert!(matches!(out.error, Some(ExtractionError::Http(_))));
    }
}
