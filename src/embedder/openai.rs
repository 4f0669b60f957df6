//! OpenAI-compatible `/embeddings` client.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{decode_json, send_with_retry, Embedder, RetryPolicy};
use crate::error::EmbedError;

/// Default OpenAI API root.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Blocking embeddings client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    retry: RetryPolicy,
}

impl OpenAiEmbedder {
    /// Builds a new OpenAI embeddings client.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        dimensions: Option<usize>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, EmbedError> {
        if api_key.trim().is_empty() {
            return Err(EmbedError::Config("missing OpenAI API key".into()));
        }
        if model.trim().is_empty() {
            return Err(EmbedError::Config("missing OpenAI model name".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| EmbedError::Config("invalid OpenAI API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| EmbedError::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.trim().to_string(),
            dimensions,
            retry,
        })
    }
}

impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let input = [text];
        let request = EmbeddingRequest {
            model: &self.model,
            input: &input,
            dimensions: self.dimensions,
        };
        let resp = send_with_retry(self.retry, || {
            self.client.post(&self.endpoint).json(&request).send()
        })?;
        let mut parsed: EmbeddingResponse = decode_json(resp)?;
        parsed.data.sort_by_key(|entry| entry.index);
        let entry = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Parse("response has no embedding entries".into()))?;
        if entry.embedding.is_empty() {
            return Err(EmbedError::EmptyEmbedding);
        }
        Ok(entry.embedding)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sends_single_input_with_dimensions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(serde_json::json!({
                "model": "text-embedding-3-small",
                "input": ["cough"],
                "dimensions": 3
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let base = format!("{}/v1/", server.uri());
        let result = tokio::task::spawn_blocking(move || {
            OpenAiEmbedder::new(
                "sk-test",
                &base,
                "text-embedding-3-small",
                Some(3),
                Duration::from_secs(5),
                RetryPolicy::new(1),
            )
            .expect("embedder")
            .embed("cough")
        })
        .await
        .expect("join");
        assert_eq!(result.expect("embedding"), vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn empty_data_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        let base = server.uri();
        let result = tokio::task::spawn_blocking(move || {
            OpenAiEmbedder::new(
                "sk-test",
                &base,
                "m",
                None,
                Duration::from_secs(5),
                RetryPolicy::new(1),
            )
            .expect("embedder")
            .embed("x")
        })
        .await
        .expect("join");
        assert!(matches!(result, Err(EmbedError::Parse(_))));
    }
}
