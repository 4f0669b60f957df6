//! Error types shared by the knowledge base, embedders, and retrieval pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while talking to an embedding service.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("embedding request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The service answered with a non-success status.
    #[error("embedding service returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, or a placeholder when unreadable.
        body: String,
    },
    /// The response body did not match the expected shape.
    #[error("malformed embedding response: {0}")]
    Parse(String),
    /// The service returned a vector with no components.
    #[error("embedding service returned an empty vector")]
    EmptyEmbedding,
    /// The client could not be constructed from the supplied settings.
    #[error("invalid embedder configuration: {0}")]
    Config(String),
}

/// Failures surfaced by the retrieval pipeline before it degrades to "no context".
#[derive(Debug, Error)]
pub enum RagError {
    /// No knowledge base has been loaded.
    #[error("knowledge base unavailable: {0}")]
    Unavailable(String),
    /// A file or directory could not be read or written.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The artifact is not valid JSON for the knowledge base schema.
    #[error("malformed knowledge base artifact: {0}")]
    Parse(#[from] serde_json::Error),
    /// The artifact parsed but its summary fields or vectors are inconsistent.
    #[error("invalid knowledge base artifact: {0}")]
    InvalidArtifact(String),
    /// The query could not be embedded.
    #[error(transparent)]
    Embedding(#[from] EmbedError),
    /// The query embedder uses a different model than the one that built the corpus.
    #[error("query embedding model {query} does not match corpus model {corpus}")]
    ModelMismatch {
        /// Model id recorded in the artifact.
        corpus: String,
        /// Model id of the configured query embedder.
        query: String,
    },
}
