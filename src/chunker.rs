//! Word-window chunking for extracted document text.

use std::fmt;

use crate::knowledge::KnowledgeChunk;

/// Sliding-window settings, counted in whitespace-delimited words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_words: usize,
}

/// Rejected chunking settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkingConfigError {
    /// Overlap must be at least one word.
    ZeroOverlap,
    /// Overlap must leave the window room to advance.
    OverlapTooLarge {
        /// Requested window size.
        chunk_size: usize,
        /// Requested overlap.
        chunk_overlap: usize,
    },
}

impl fmt::Display for ChunkingConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroOverlap => write!(f, "chunk overlap must be at least one word"),
            Self::OverlapTooLarge {
                chunk_size,
                chunk_overlap,
            } => write!(
                f,
                "chunk overlap {chunk_overlap} must be smaller than chunk size {chunk_size}"
            ),
        }
    }
}

impl std::error::Error for ChunkingConfigError {}

impl ChunkingConfig {
    /// Validates and builds a chunking config.
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        min_chunk_words: usize,
    ) -> Result<Self, ChunkingConfigError> {
        if chunk_overlap == 0 {
            return Err(ChunkingConfigError::ZeroOverlap);
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkingConfigError::OverlapTooLarge {
                chunk_size,
                chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            min_chunk_words,
        })
    }

    /// Words per window.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Words shared between consecutive windows.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Windows shorter than this are dropped.
    pub fn min_chunk_words(&self) -> usize {
        self.min_chunk_words
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
            min_chunk_words: 50,
        }
    }
}

/// Splits `text` into overlapping word windows tagged with `source`.
///
/// The window that reaches the end of the text is the last one, so every
/// pair of consecutive chunks shares exactly `chunk_overlap` words.
/// Embeddings are left empty for the builder to fill in.
pub fn chunk_text(text: &str, source: &str, config: &ChunkingConfig) -> Vec<KnowledgeChunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < words.len() {
        let end = (start + config.chunk_size).min(words.len());
        let window = &words[start..end];
        if window.len() >= config.min_chunk_words {
            chunks.push(KnowledgeChunk::new(source, chunks.len(), window.join(" ")));
        }
        if end == words.len() {
            break;
        }
        start += config.stride();
    }
    chunks
}
