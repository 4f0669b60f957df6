//! Brute-force cosine ranking over the loaded corpus.

use serde::Serialize;

use crate::knowledge::KnowledgeChunk;

/// Default number of chunks returned per query.
pub const DEFAULT_TOP_K: usize = 3;
/// Default similarity floor.
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.3;

/// A chunk borrowed from the loaded corpus with its query similarity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RetrievalResult<'kb> {
    /// Matched chunk.
    pub chunk: &'kb KnowledgeChunk,
    /// Cosine similarity against the query.
    pub similarity: f32,
}

/// Per-query retrieval knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalOptions {
    /// Maximum number of results.
    pub top_k: usize,
    /// Results below this similarity are dropped.
    pub min_similarity: f32,
}

impl RetrievalOptions {
    /// Options with an explicit `top_k` and the default threshold.
    pub fn with_top_k(top_k: usize) -> Self {
        Self {
            top_k,
            ..Self::default()
        }
    }
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }
}

/// Cosine similarity of two equal-length vectors.
///
/// Returns 0.0 when either vector has zero norm or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let magnitude = norm_a.sqrt() * norm_b.sqrt();
    if magnitude == 0.0 {
        return 0.0;
    }
    (dot / magnitude) as f32
}

/// Scores every embedded chunk of matching dimensionality and keeps the best.
///
/// Sorting is stable, so equal scores keep corpus order.
pub fn rank<'kb>(
    chunks: &'kb [KnowledgeChunk],
    query: &[f32],
    options: RetrievalOptions,
) -> Vec<RetrievalResult<'kb>> {
    if query.is_empty() || options.top_k == 0 {
        return Vec::new();
    }
    let mut results: Vec<RetrievalResult<'kb>> = chunks
        .iter()
        .filter(|chunk| chunk.embedding.len() == query.len())
        .filter_map(|chunk| {
            let similarity = cosine_similarity(query, &chunk.embedding);
            (similarity >= options.min_similarity).then_some(RetrievalResult { chunk, similarity })
        })
        .collect();
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(options.top_k);
    results
}
