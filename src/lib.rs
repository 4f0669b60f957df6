#![warn(missing_docs)]
//! Retrieval-augmented context for medical chat prompts.
//!
//! A corpus of pre-embedded document chunks is built offline
//! ([`builder::CorpusBuilder`]), loaded once at runtime
//! ([`knowledge::KnowledgeBaseLoader`]), and queried through
//! [`service::RagService`], which embeds the query, ranks chunks by cosine
//! similarity, and renders a prompt-ready context block with citations.

pub mod builder;
pub mod chunker;
pub mod config;
pub mod context;
pub mod embedder;
pub mod error;
pub mod knowledge;
pub mod logging;
pub mod retrieval;
pub mod service;

pub use builder::{BuildReport, CorpusBuilder};
pub use chunker::{chunk_text, ChunkingConfig};
pub use context::{cited_sources, Citation, RagContext};
pub use embedder::{Embedder, RetryPolicy};
pub use error::{EmbedError, RagError};
pub use knowledge::{KnowledgeBase, KnowledgeBaseLoader, KnowledgeBaseStats, KnowledgeChunk};
pub use retrieval::{cosine_similarity, RetrievalOptions, RetrievalResult};
pub use service::RagService;
