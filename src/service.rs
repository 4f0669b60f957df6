//! The retrieval pipeline as one injectable service object.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use lru::LruCache;
use tracing::{debug, error, warn};

use crate::context::{render_context, render_context_with_citations, RagContext};
use crate::embedder::{truncate_chars, Embedder, DEFAULT_MAX_INPUT_CHARS};
use crate::error::RagError;
use crate::knowledge::{KnowledgeBaseLoader, KnowledgeBaseStats};
use crate::retrieval::{rank, RetrievalOptions, RetrievalResult, DEFAULT_MIN_SIMILARITY};

/// Owns the corpus loader and query embedder and answers retrieval calls.
///
/// Every public retrieval method except [`RagService::try_retrieve`]
/// degrades to "no context" on failure and logs the reason.
pub struct RagService {
    loader: KnowledgeBaseLoader,
    embedder: Box<dyn Embedder>,
    min_similarity: f32,
    max_input_chars: usize,
    query_cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl RagService {
    /// Wires a loader to an embedder; nothing is loaded until first use.
    pub fn new(loader: KnowledgeBaseLoader, embedder: Box<dyn Embedder>) -> Self {
        Self {
            loader,
            embedder,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            query_cache: None,
        }
    }

    /// Similarity floor used by the context helpers.
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    /// Character budget for query text sent to the embedder.
    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars.max(1);
        self
    }

    /// Keeps up to `capacity` query embeddings in memory; 0 disables caching.
    pub fn with_query_cache(mut self, capacity: usize) -> Self {
        self.query_cache = NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        self
    }

    /// Loads the corpus if needed; `false` means retrieval is unavailable.
    pub fn load_knowledge_base(&self) -> bool {
        self.loader.load()
    }

    /// Loaded and non-empty.
    pub fn is_knowledge_base_available(&self) -> bool {
        self.loader.is_available()
    }

    /// Summary of the loaded corpus, if any.
    pub fn knowledge_base_stats(&self) -> Option<KnowledgeBaseStats> {
        self.loader.stats()
    }

    /// Similarity floor applied by [`RagService::rag_context`].
    pub fn min_similarity(&self) -> f32 {
        self.min_similarity
    }

    /// Model id of the query embedder.
    pub fn embedding_model(&self) -> &str {
        self.embedder.model_id()
    }

    /// Embeds a query, consulting the cache first.
    pub fn embed_query(&self, query: &str) -> Result<Vec<f32>, RagError> {
        let input = truncate_chars(query, self.max_input_chars);
        if let Some(cache) = &self.query_cache {
            let mut guard = cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(hit) = guard.get(input) {
                debug!("query embedding cache hit");
                return Ok(hit.clone());
            }
        }

        let embedding = self.embedder.embed(input)?;

        if let Some(cache) = &self.query_cache {
            let mut guard = cache.lock().unwrap_or_else(PoisonError::into_inner);
            guard.put(input.to_string(), embedding.clone());
        }
        Ok(embedding)
    }

    /// Retrieval with the failure reason kept.
    pub fn try_retrieve(
        &self,
        query: &str,
        options: RetrievalOptions,
    ) -> Result<Vec<RetrievalResult<'_>>, RagError> {
        let kb = self
            .loader
            .try_load()
            .map_err(|err| RagError::Unavailable(err.to_string()))?;
        if kb.total_chunks == 0 {
            return Err(RagError::Unavailable("knowledge base is empty".into()));
        }
        if let Some(corpus_model) = &kb.embedding_model {
            let query_model = self.embedder.model_id();
            if normalize_model(corpus_model) != normalize_model(query_model) {
                return Err(RagError::ModelMismatch {
                    corpus: corpus_model.clone(),
                    query: query_model.to_string(),
                });
            }
        }
        if query.trim().is_empty() {
            debug!("blank query; skipping retrieval");
            return Ok(Vec::new());
        }

        let embedding = self.embed_query(query)?;
        if let Some(dimension) = kb.dimension().filter(|&d| d != embedding.len()) {
            warn!(
                corpus_dimension = dimension,
                query_dimension = embedding.len(),
                "query embedding dimensionality does not match the corpus"
            );
        }
        let results = rank(&kb.chunks, &embedding, options);
        debug!(
            matched = results.len(),
            top_k = options.top_k,
            min_similarity = options.min_similarity,
            "retrieval complete"
        );
        Ok(results)
    }

    /// Retrieval that never fails: every error becomes an empty result.
    pub fn retrieve_relevant_context(
        &self,
        query: &str,
        options: RetrievalOptions,
    ) -> Vec<RetrievalResult<'_>> {
        match self.try_retrieve(query, options) {
            Ok(results) => results,
            Err(err @ RagError::Embedding(_)) => {
                error!(error = %err, "failed to embed query");
                Vec::new()
            }
            Err(err) => {
                warn!(error = %err, "retrieval unavailable");
                Vec::new()
            }
        }
    }

    /// Plain grounding context for a prompt, or `""` when nothing matched.
    pub fn rag_context(&self, query: &str, top_k: usize) -> String {
        let results = self.retrieve_relevant_context(query, self.options(top_k));
        render_context(&results)
    }

    /// Grounding context with `[N]` markers plus the matching citation list.
    pub fn rag_context_with_citations(&self, query: &str, top_k: usize) -> RagContext {
        let results = self.retrieve_relevant_context(query, self.options(top_k));
        render_context_with_citations(&results)
    }

    fn options(&self, top_k: usize) -> RetrievalOptions {
        RetrievalOptions {
            top_k,
            min_similarity: self.min_similarity,
        }
    }
}

fn normalize_model(model: &str) -> &str {
    model.trim().trim_start_matches("models/")
}
