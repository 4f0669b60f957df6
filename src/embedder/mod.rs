//! Embedding service clients shared by the corpus builder and query path.
//!
//! The corpus and every query must be embedded by the same model; the model
//! id is recorded in the artifact and checked by [`crate::RagService`].

pub mod gemini;
pub mod openai;

use std::thread;
use std::time::Duration;

use reqwest::blocking::Response;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::EmbedError;

pub use gemini::GeminiEmbedder;
pub use openai::OpenAiEmbedder;

/// Character budget applied to embedding inputs.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8000;

/// A client that maps text into a fixed-dimensional vector space.
pub trait Embedder: Send + Sync {
    /// Identifier of the model producing the vectors.
    fn model_id(&self) -> &str;

    /// Embeds one piece of text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Returns at most `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Retry budget for transient embedding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_backoff: Duration,
}

impl RetryPolicy {
    /// Allows up to `max_attempts` requests (at least one).
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff: Duration::from_millis(500),
        }
    }

    /// Overrides the first backoff step; later steps double it.
    pub fn with_base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    /// Maximum number of requests per call.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        self.base_backoff * (1 << capped)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
}

/// Sends a request until it succeeds or the retry budget runs out.
pub(crate) fn send_with_retry<F>(policy: RetryPolicy, mut send: F) -> Result<Response, EmbedError>
where
    F: FnMut() -> reqwest::Result<Response>,
{
    let mut attempt = 0usize;
    loop {
        match send() {
            Ok(resp) if resp.status().is_success() => return Ok(resp),
            Ok(resp) => {
                let status = resp.status();
                let body = resp
                    .text()
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                if should_retry(status) && attempt + 1 < policy.max_attempts {
                    attempt += 1;
                    debug!(%status, attempt, "retrying embedding request");
                    thread::sleep(policy.backoff(attempt));
                    continue;
                }
                return Err(EmbedError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            Err(err) => {
                if is_retryable_error(&err) && attempt + 1 < policy.max_attempts {
                    attempt += 1;
                    debug!(error = %err, attempt, "retrying embedding request");
                    thread::sleep(policy.backoff(attempt));
                    continue;
                }
                return Err(err.into());
            }
        }
    }
}

/// Reads a response body and decodes it as JSON.
pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, EmbedError> {
    let body = resp.text()?;
    serde_json::from_str(&body).map_err(|err| EmbedError::Parse(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("short", 80), "short");
        assert_eq!(truncate_chars("", 3), "");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10).with_base_backoff(Duration::from_millis(10));
        assert_eq!(policy.backoff(1), Duration::from_millis(20));
        assert_eq!(policy.backoff(2), Duration::from_millis(40));
        assert_eq!(policy.backoff(9), Duration::from_millis(320));
        assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
    }
}
