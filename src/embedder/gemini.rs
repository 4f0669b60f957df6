//! Gemini `embedContent` client.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{decode_json, send_with_retry, Embedder, RetryPolicy};
use crate::error::EmbedError;

/// Default Generative Language API root.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Embedding model the bundled corpus is built with.
pub const DEFAULT_GEMINI_EMBEDDING_MODEL: &str = "text-embedding-004";

/// Blocking embeddings client for the Gemini API.
#[derive(Clone)]
pub struct GeminiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    model_path: String,
    retry: RetryPolicy,
}

impl GeminiEmbedder {
    /// Builds a client; `model` may be given with or without the `models/` prefix.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, EmbedError> {
        if api_key.trim().is_empty() {
            return Err(EmbedError::Config("missing Gemini API key".into()));
        }
        let model = model.trim().trim_start_matches("models/").to_string();
        if model.is_empty() {
            return Err(EmbedError::Config("missing Gemini embedding model".into()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key.trim())
                .map_err(|_| EmbedError::Config("invalid Gemini API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| EmbedError::Config(format!("failed to build HTTP client: {err}")))?;

        let model_path = format!("models/{model}");
        let endpoint = format!("{}/{}:embedContent", base_url.trim_end_matches('/'), model_path);
        Ok(Self {
            client,
            endpoint,
            model,
            model_path,
            retry,
        })
    }
}

impl Embedder for GeminiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let request = EmbedContentRequest {
            model: &self.model_path,
            content: Content {
                parts: [Part { text }],
            },
        };
        let resp = send_with_retry(self.retry, || {
            self.client.post(&self.endpoint).json(&request).send()
        })?;
        let parsed: EmbedContentResponse = decode_json(resp)?;
        let values = parsed
            .embedding
            .ok_or_else(|| EmbedError::Parse("response has no `embedding` field".into()))?
            .values;
        if values.is_empty() {
            return Err(EmbedError::EmptyEmbedding);
        }
        Ok(values)
    }
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}
