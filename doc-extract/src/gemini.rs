use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{Document, DocumentExtractor, ExtractError};

/// Default Generative Language API root.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Multimodal model used to read documents.
pub const DEFAULT_EXTRACTION_MODEL: &str = "gemini-2.0-flash";

const INSTRUCTION: &str = "Extract all the text content from this medical document.
Preserve the structure including section headings, paragraphs, and key information.
Return the full extracted text, maintaining readability.";

/// Sends documents inline (base64) to Gemini `generateContent`.
#[derive(Clone)]
pub struct GeminiExtractor {
    client: Client,
    endpoint: String,
    max_attempts: usize,
    backoff: Duration,
}

impl GeminiExtractor {
    /// Builds a client; `model` may carry the `models/` prefix.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ExtractError> {
        if api_key.trim().is_empty() {
            return Err(ExtractError::Config("missing Gemini API key".into()));
        }
        let model = model.trim().trim_start_matches("models/");
        if model.is_empty() {
            return Err(ExtractError::Config("missing extraction model".into()));
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key.trim())
                .map_err(|_| ExtractError::Config("invalid Gemini API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| ExtractError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/models/{model}:generateContent",
                base_url.trim_end_matches('/')
            ),
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        })
    }

    /// Total requests allowed per document on 429/5xx responses.
    pub fn with_retries(mut self, max_attempts: usize, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    fn send(&self, request: &GenerateRequest<'_>) -> Result<Response, ExtractError> {
        let mut attempt = 0usize;
        loop {
            let resp = self.client.post(&self.endpoint).json(request).send()?;
            let status = resp.status();
            if status.is_success() {
                return Ok(resp);
            }
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt + 1 < self.max_attempts {
                attempt += 1;
                tracing::debug!(%status, attempt, "retrying extraction request");
                thread::sleep(self.backoff * (1 << attempt.min(5) as u32));
                continue;
            }
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ExtractError::Status {
                status: status.as_u16(),
                body,
            });
        }
    }
}

impl DocumentExtractor for GeminiExtractor {
    fn extract(&self, document: &Document) -> Result<String, ExtractError> {
        let data = STANDARD.encode(&document.bytes);
        let request = GenerateRequest {
            contents: [RequestContent {
                parts: [
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: &document.mime_type,
                            data: &data,
                        },
                    },
                    RequestPart::Text { text: INSTRUCTION },
                ],
            }],
        };
        tracing::debug!(
            name = %document.name,
            mime = %document.mime_type,
            bytes = document.bytes.len(),
            "sending document for extraction"
        );
        let resp = self.send(&request)?;
        let body = resp.text()?;
        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|err| ExtractError::Parse(err.to_string()))?;
        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ExtractError::Parse("response has no candidates".into()))?;
        let text: String = candidate
            .content
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            return Err(ExtractError::Empty(document.name.clone()));
        }
        Ok(text.to_string())
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 2],
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}
