use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

use super::{ExtractionBackend, ExtractionError};
use crate::Config;
use crate::raster::PageImage;

/// Gemini REST base URL used by the Developer API.
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

const USER_AGENT: &str = concat!("chosho/", env!("CARGO_PKG_VERSION"));

/// Gemini `generateContent` client for single-page extraction.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: GEMINI_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(crate::DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Build a backend from config, or `None` when no API key is set.
    pub fn from_config(config: &Config) -> Option<Self> {
        if !config.has_api_key() {
            return None;
        }
        let key = config.google_api_key.clone()?;
        Some(
            Self::new(key)
                .with_model(&config.model)
                .with_base_url(&config.api_base_url)
                .with_timeout(Duration::from_secs(config.request_timeout_secs)),
        )
    }

    pub fn with_model(mut self, model: impl AsRef<str>) -> Self {
        self.model = sanitize_model(model.as_ref());
        self
    }

    /// Override the REST base URL (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

/// Strip a leading `models/` so both `gemini-2.0-flash` and
/// `models/gemini-2.0-flash` are accepted.
fn sanitize_model(model: &str) -> String {
    let trimmed = model.trim();
    trimmed
        .strip_prefix("models/")
        .unwrap_or(trimmed)
        .to_string()
}

impl ExtractionBackend for GeminiBackend {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        page: &'a PageImage,
    ) -> Pin<Box<dyn Future<Output = Result<String, ExtractionError>> + Send + 'a>> {
        Box::pin(async move {
            let body = GenerateContentRequest::for_page(prompt, &page.png);

            let resp = self
                .client
                .post(self.endpoint())
                .header("x-goog-api-key", &self.api_key)
                .header("User-Agent", USER_AGENT)
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await
                .map_err(|e| ExtractionError::Http(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(ExtractionError::Api {
                    status: status.as_u16(),
                    message: api_error_message(&text),
                });
            }

            let data: GenerateContentResponse = resp
                .json()
                .await
                .map_err(|e| ExtractionError::Http(e.to_string()))?;

            data.text().ok_or(ExtractionError::EmptyResponse)
        })
    }
}

// ── Wire types ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: &'static str,
    data: String,
}

impl<'a> GenerateContentRequest<'a> {
    pub(crate) fn for_page(prompt: &'a str, png: &[u8]) -> Self {
        Self {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    RequestPart::Text { text: prompt },
                    RequestPart::Inline {
                        inline_data: InlineData {
                            mime_type: "image/png",
                            data: BASE64.encode(png),
                        },
                    },
                ],
            }],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

impl GenerateContentResponse {
    /// Concatenated non-thought text of the first candidate.
    pub(crate) fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter(|p| !p.thought)
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.trim().is_empty() { None } else { Some(text) }
    }
}

/// Pull `error.message` out of a Gemini error body, falling back to the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(500).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_has_prompt_then_inline_png() {
        let body = GenerateContentRequest::for_page("PROMPT", &[1, 2, 3]);
        let json = serde_json::to_value(&body).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(parts[0]["text"], "PROMPT");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "AQID");
    }

    #[test]
    fn response_text_joins_parts_and_skips_thoughts() {
        let resp: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [
                {"text": "thinking...", "thought": true},
                {"text": "{\"records\":"},
                {"text": " []}"}
            ]}}]}"#,
        )
        .unwrap();
        assert_eq!(resp.text().as_deref(), Some("{\"records\": []}"));
    }

    #[test]
    fn response_without_candidates_has_no_text() {
        let resp: GenerateContentResponse = serde_json::from_str(r#"{"promptFeedback": {}}"#).unwrap();
        assert_eq!(resp.text(), None);
    }

    #[test]
    fn api_error_message_prefers_structured_message() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid."}}"#;
        assert_eq!(api_error_message(body), "API key not valid.");
        assert_eq!(api_error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn endpoint_uses_sanitized_model() {
        let backend = GeminiBackend::new("k")
            .with_model("models/gemini-2.5-flash")
            .with_base_url("http://localhost:9000/v1beta/");
        assert_eq!(
            backend.endpoint(),
            "http://localhost:9000/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn from_config_requires_key() {
        assert!(GeminiBackend::from_config(&Config::default()).is_none());
        let config = Config {
            google_api_key: Some("abc".into()),
            model: "gemini-1.5-pro".into(),
            ..Config::default()
        };
        let backend = GeminiBackend::from_config(&config).unwrap();
        assert_eq!(backend.model(), "gemini-1.5-pro");
        assert!(!format!("{:?}", backend).contains("abc"));
    }
}
