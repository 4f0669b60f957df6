//! Persisted knowledge base artifact plus the load-once loader that serves it.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::RagError;

/// Artifact format version written by the corpus builder.
pub const FORMAT_VERSION: &str = "1.0";

/// One retrievable slice of source text and its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeChunk {
    /// `{source}_chunk_{chunk_index}`.
    pub id: String,
    /// Chunk body text.
    pub text: String,
    /// Deduplicated logical source key.
    pub source: String,
    /// Zero-based position within the source.
    pub chunk_index: usize,
    /// Embedding vector; empty when the chunk was never embedded.
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl KnowledgeChunk {
    /// Creates an un-embedded chunk with the canonical identifier.
    pub fn new(source: &str, chunk_index: usize, text: String) -> Self {
        Self {
            id: format!("{source}_chunk_{chunk_index}"),
            text,
            source: source.to_string(),
            chunk_index,
            embedding: Vec::new(),
        }
    }

    /// True once an embedding vector has been attached.
    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }
}

/// The full persisted corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBase {
    /// Format version tag.
    pub version: String,
    /// Build timestamp.
    pub generated_at: DateTime<Utc>,
    /// Must equal `chunks.len()`.
    pub total_chunks: usize,
    /// Distinct chunk sources.
    pub sources: Vec<String>,
    /// Embedding model that produced the chunk vectors, when recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    /// Every chunk in build order.
    pub chunks: Vec<KnowledgeChunk>,
}

/// Summary numbers exposed to callers and the HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseStats {
    /// Number of chunks in the corpus.
    pub total_chunks: usize,
    /// Source keys in the corpus.
    pub sources: Vec<String>,
}

impl KnowledgeBase {
    /// Assembles an artifact from built chunks, deriving the summary fields.
    pub fn from_chunks(chunks: Vec<KnowledgeChunk>, embedding_model: Option<String>) -> Self {
        let mut seen = HashSet::new();
        let sources = chunks
            .iter()
            .filter(|chunk| seen.insert(chunk.source.as_str()))
            .map(|chunk| chunk.source.clone())
            .collect();
        Self {
            version: FORMAT_VERSION.to_string(),
            generated_at: Utc::now(),
            total_chunks: chunks.len(),
            sources,
            embedding_model,
            chunks,
        }
    }

    /// Parses and validates an artifact.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RagError> {
        let kb: KnowledgeBase = serde_json::from_slice(bytes)?;
        kb.validate()?;
        Ok(kb)
    }

    /// Checks the redundant summary fields and vector dimensionality.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.total_chunks != self.chunks.len() {
            return Err(RagError::InvalidArtifact(format!(
                "totalChunks is {} but the artifact holds {} chunks",
                self.total_chunks,
                self.chunks.len()
            )));
        }

        let mut sources = HashSet::with_capacity(self.sources.len());
        for source in &self.sources {
            if !sources.insert(source.as_str()) {
                return Err(RagError::InvalidArtifact(format!(
                    "source {source:?} is listed more than once"
                )));
            }
        }

        let mut dimension: Option<usize> = None;
        for chunk in &self.chunks {
            if !sources.contains(chunk.source.as_str()) {
                return Err(RagError::InvalidArtifact(format!(
                    "chunk {} references unlisted source {:?}",
                    chunk.id, chunk.source
                )));
            }
            if !chunk.has_embedding() {
                continue;
            }
            match dimension {
                None => dimension = Some(chunk.embedding.len()),
                Some(expected) if expected != chunk.embedding.len() => {
                    return Err(RagError::InvalidArtifact(format!(
                        "chunk {} has a {}-dimensional embedding, expected {}",
                        chunk.id,
                        chunk.embedding.len(),
                        expected
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Dimensionality shared by every embedded chunk.
    pub fn dimension(&self) -> Option<usize> {
        self.chunks
            .iter()
            .find(|chunk| chunk.has_embedding())
            .map(|chunk| chunk.embedding.len())
    }

    /// Summary fields.
    pub fn stats(&self) -> KnowledgeBaseStats {
        KnowledgeBaseStats {
            total_chunks: self.total_chunks,
            sources: self.sources.clone(),
        }
    }

    /// Writes the artifact as pretty-printed JSON, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<(), RagError> {
        let io_err = |source| RagError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n").map_err(io_err)?;
        writer.flush().map_err(io_err)?;
        Ok(())
    }
}

/// Where the loader reads the artifact from.
#[derive(Debug, Clone)]
pub enum ArtifactSource {
    /// JSON file on disk.
    File(PathBuf),
    /// In-memory JSON, e.g. an `include_bytes!` bundle.
    Bytes(Arc<[u8]>),
}

impl ArtifactSource {
    fn read(&self) -> Result<Cow<'_, [u8]>, RagError> {
        match self {
            Self::File(path) => fs::read(path)
                .map(Cow::Owned)
                .map_err(|source| RagError::Io {
                    path: path.clone(),
                    source,
                }),
            Self::Bytes(bytes) => Ok(Cow::Borrowed(bytes)),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Bytes(bytes) => format!("<{} bundled bytes>", bytes.len()),
        }
    }
}

/// Loads the artifact on first use and serves the cached corpus afterwards.
///
/// A failed load caches nothing, so a later call retries. Concurrent first
/// calls are serialized so the artifact is read at most once per success.
#[derive(Debug)]
pub struct KnowledgeBaseLoader {
    source: ArtifactSource,
    loaded: OnceLock<KnowledgeBase>,
    load_guard: Mutex<()>,
    artifact_reads: AtomicUsize,
}

impl KnowledgeBaseLoader {
    /// Creates a loader that has not read anything yet.
    pub fn new(source: ArtifactSource) -> Self {
        Self {
            source,
            loaded: OnceLock::new(),
            load_guard: Mutex::new(()),
            artifact_reads: AtomicUsize::new(0),
        }
    }

    /// Loader backed by a JSON file.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(ArtifactSource::File(path.into()))
    }

    /// Loader backed by in-memory JSON.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::new(ArtifactSource::Bytes(bytes.into()))
    }

    /// Loader that already holds a corpus built in-process.
    pub fn preloaded(knowledge_base: KnowledgeBase) -> Self {
        let loader = Self::from_bytes(Vec::new());
        let _ = loader.loaded.set(knowledge_base);
        loader
    }

    /// Loads the artifact if needed and returns the cached corpus.
    pub fn try_load(&self) -> Result<&KnowledgeBase, RagError> {
        if let Some(kb) = self.loaded.get() {
            return Ok(kb);
        }
        let _guard = self
            .load_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(kb) = self.loaded.get() {
            return Ok(kb);
        }

        let attempt = self.artifact_reads.fetch_add(1, Ordering::Relaxed) + 1;
        let bytes = self.source.read()?;
        let kb = KnowledgeBase::from_slice(&bytes)?;
        info!(
            attempt,
            chunks = kb.total_chunks,
            sources = kb.sources.len(),
            artifact = %self.source.describe(),
            "loaded knowledge base"
        );
        Ok(self.loaded.get_or_init(|| kb))
    }

    /// Idempotent load; `false` means retrieval is not possible.
    pub fn load(&self) -> bool {
        match self.try_load() {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    artifact = %self.source.describe(),
                    attempts = self.artifact_reads(),
                    error = %err,
                    "knowledge base not available"
                );
                false
            }
        }
    }

    /// The cached corpus, if a load has succeeded.
    pub fn get(&self) -> Option<&KnowledgeBase> {
        self.loaded.get()
    }

    /// Loaded and non-empty.
    pub fn is_available(&self) -> bool {
        self.get().is_some_and(|kb| kb.total_chunks > 0)
    }

    /// Summary of the loaded corpus.
    pub fn stats(&self) -> Option<KnowledgeBaseStats> {
        self.get().map(KnowledgeBase::stats)
    }

    /// Number of times the artifact has been read from its source.
    #[doc(hidden)]
    pub fn artifact_reads(&self) -> usize {
        self.artifact_reads.load(Ordering::Relaxed)
    }
}
