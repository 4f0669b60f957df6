//! Command-line flag groups shared by the binaries.
//!
//! Every flag has an environment fallback so deployments can configure the
//! binaries without wrapper scripts.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::chunker::{ChunkingConfig, ChunkingConfigError};
use crate::embedder::gemini::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_EMBEDDING_MODEL};
use crate::embedder::openai::DEFAULT_OPENAI_BASE_URL;
use crate::embedder::{
    Embedder, GeminiEmbedder, OpenAiEmbedder, RetryPolicy, DEFAULT_MAX_INPUT_CHARS,
};
use crate::error::EmbedError;
use crate::knowledge::KnowledgeBaseLoader;
use crate::retrieval::{RetrievalOptions, DEFAULT_MIN_SIMILARITY, DEFAULT_TOP_K};
use crate::service::RagService;

/// Artifact location used when nothing else is configured.
pub const DEFAULT_KNOWLEDGE_BASE_PATH: &str = "assets/medical-knowledge.json";
/// Default OpenAI embedding model.
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Embedding backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbeddingProvider {
    /// Gemini `embedContent`.
    Gemini,
    /// OpenAI-compatible `/embeddings`.
    Openai,
}

/// Embedding service settings.
#[derive(Args, Debug, Clone)]
pub struct EmbeddingArgs {
    /// Which embedding API to call
    #[arg(
        long,
        env = "MEDRAG_EMBEDDING_PROVIDER",
        value_enum,
        default_value_t = EmbeddingProvider::Gemini
    )]
    pub embedding_provider: EmbeddingProvider,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Embedding model; defaults to the provider's standard model
    #[arg(long, env = "MEDRAG_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// API root override for the embedding provider
    #[arg(long, env = "MEDRAG_EMBEDDING_BASE_URL")]
    pub embedding_base_url: Option<String>,

    /// Output dimensionality override (OpenAI only)
    #[arg(long, env = "MEDRAG_EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,

    /// Max seconds to wait for each embedding request
    #[arg(long, env = "MEDRAG_EMBEDDING_TIMEOUT_SECS", default_value_t = 30)]
    pub embedding_timeout_secs: u64,

    /// Requests per embedding call, including retries on 429/5xx
    #[arg(long, env = "MEDRAG_EMBEDDING_MAX_ATTEMPTS", default_value_t = 3)]
    pub embedding_max_attempts: usize,

    /// Characters of input text sent per embedding call
    #[arg(long, env = "MEDRAG_MAX_INPUT_CHARS", default_value_t = DEFAULT_MAX_INPUT_CHARS)]
    pub max_input_chars: usize,
}

impl EmbeddingArgs {
    /// Model name after applying the provider default.
    pub fn model(&self) -> &str {
        match (&self.embedding_model, self.embedding_provider) {
            (Some(model), _) => model,
            (None, EmbeddingProvider::Gemini) => DEFAULT_GEMINI_EMBEDDING_MODEL,
            (None, EmbeddingProvider::Openai) => DEFAULT_OPENAI_EMBEDDING_MODEL,
        }
    }

    /// Builds the configured embedding client.
    pub fn build_embedder(&self) -> Result<Box<dyn Embedder>, EmbedError> {
        let timeout = Duration::from_secs(self.embedding_timeout_secs.max(1));
        let retry = RetryPolicy::new(self.embedding_max_attempts);
        match self.embedding_provider {
            EmbeddingProvider::Gemini => {
                let key = self.gemini_api_key.as_deref().unwrap_or_default();
                let base = self
                    .embedding_base_url
                    .as_deref()
                    .unwrap_or(DEFAULT_GEMINI_BASE_URL);
                Ok(Box::new(GeminiEmbedder::new(
                    key,
                    base,
                    self.model(),
                    timeout,
                    retry,
                )?))
            }
            EmbeddingProvider::Openai => {
                let key = self.openai_api_key.as_deref().unwrap_or_default();
                let base = self
                    .embedding_base_url
                    .as_deref()
                    .unwrap_or(DEFAULT_OPENAI_BASE_URL);
                Ok(Box::new(OpenAiEmbedder::new(
                    key,
                    base,
                    self.model(),
                    self.embedding_dimensions,
                    timeout,
                    retry,
                )?))
            }
        }
    }
}

/// Query-side retrieval settings.
#[derive(Args, Debug, Clone)]
pub struct RetrievalArgs {
    /// Knowledge base artifact to load
    #[arg(long, env = "MEDRAG_KNOWLEDGE_BASE", default_value = DEFAULT_KNOWLEDGE_BASE_PATH)]
    pub knowledge_base: PathBuf,

    /// Chunks returned per query
    #[arg(long, env = "MEDRAG_TOP_K", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Similarity floor for returned chunks
    #[arg(long, env = "MEDRAG_MIN_SIMILARITY", default_value_t = DEFAULT_MIN_SIMILARITY)]
    pub min_similarity: f32,

    /// Query embeddings kept in memory (0 disables the cache)
    #[arg(long, env = "MEDRAG_QUERY_CACHE_SIZE", default_value_t = 256)]
    pub query_cache_size: usize,
}

impl RetrievalArgs {
    /// Per-query options derived from the flags.
    pub fn options(&self) -> RetrievalOptions {
        RetrievalOptions {
            top_k: self.top_k,
            min_similarity: self.min_similarity,
        }
    }

    /// Wires a service over the configured artifact and embedder.
    pub fn build_service(&self, embedding: &EmbeddingArgs) -> Result<RagService, EmbedError> {
        let embedder = embedding.build_embedder()?;
        Ok(
            RagService::new(KnowledgeBaseLoader::from_path(&self.knowledge_base), embedder)
                .with_min_similarity(self.min_similarity)
                .with_max_input_chars(embedding.max_input_chars)
                .with_query_cache(self.query_cache_size),
        )
    }
}

/// Word-window chunking settings for corpus builds.
#[derive(Args, Debug, Clone)]
pub struct ChunkingArgs {
    /// Words per chunk
    #[arg(long, env = "MEDRAG_CHUNK_SIZE", default_value_t = 800)]
    pub chunk_size: usize,

    /// Words shared by consecutive chunks
    #[arg(long, env = "MEDRAG_CHUNK_OVERLAP", default_value_t = 100)]
    pub chunk_overlap: usize,

    /// Chunks shorter than this many words are dropped
    #[arg(long, env = "MEDRAG_MIN_CHUNK_WORDS", default_value_t = 50)]
    pub min_chunk_words: usize,
}

impl ChunkingArgs {
    /// Validated chunking config.
    pub fn config(&self) -> Result<ChunkingConfig, ChunkingConfigError> {
        ChunkingConfig::new(self.chunk_size, self.chunk_overlap, self.min_chunk_words)
    }
}
