//! Offline corpus construction: discover, dedupe, extract, chunk, embed.
//!
//! Sources are processed one at a time and embedding calls are spaced by a
//! fixed delay. A source that fails anywhere is dropped as a whole.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use doc_extract::{Document, DocumentExtractor, ExtractError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chunker::{chunk_text, ChunkingConfig};
use crate::embedder::{truncate_chars, Embedder, DEFAULT_MAX_INPUT_CHARS};
use crate::error::{EmbedError, RagError};
use crate::knowledge::{KnowledgeBase, KnowledgeChunk};

/// Pause between consecutive embedding calls.
pub const DEFAULT_EMBED_DELAY: Duration = Duration::from_millis(200);

const PROGRESS_EVERY: usize = 5;

/// Stable deduplication key of a source file name.
///
/// Drops the extension, then a trailing `_<digits>` upload suffix:
/// `doc_1700000000.pdf` becomes `doc`.
pub fn source_key(file_name: &str) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    match stem.rsplit_once('_') {
        Some((base, suffix))
            if !base.is_empty()
                && !suffix.is_empty()
                && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base.to_string()
        }
        _ => stem.to_string(),
    }
}

/// Lists files in `dir` whose extension is in `extensions`, sorted by name.
pub fn discover_sources(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, RagError> {
    let io_err = |source| RagError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)));
        if matches {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// A source file and its deduplication key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Logical source name stored on every chunk.
    pub key: String,
    /// File to read.
    pub path: PathBuf,
}

/// Keeps the first file per key; returns the kept files and the skipped ones.
pub fn dedupe_sources(paths: &[PathBuf]) -> (Vec<SourceFile>, Vec<PathBuf>) {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    let mut duplicates = Vec::new();
    for path in paths {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();
        let key = source_key(&file_name);
        if seen.insert(key.clone()) {
            unique.push(SourceFile {
                key,
                path: path.clone(),
            });
        } else {
            duplicates.push(path.clone());
        }
    }
    (unique, duplicates)
}

/// A source that was dropped from the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFailure {
    /// Source key.
    pub source: String,
    /// Human-readable failure reason.
    pub reason: String,
}

/// Outcome of a build run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    /// Sources that contributed chunks (possibly zero chunks).
    pub sources_processed: usize,
    /// Files skipped because an earlier file had the same key.
    pub duplicates_skipped: Vec<PathBuf>,
    /// Sources dropped after an extraction or embedding failure.
    pub failed: Vec<SourceFailure>,
    /// Chunks in the resulting artifact.
    pub total_chunks: usize,
}

#[derive(Debug, Error)]
enum SourceError {
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("embedding chunk {index} failed: {source}")]
    Embed {
        index: usize,
        #[source]
        source: EmbedError,
    },
}

/// Serial corpus builder over an extractor and an embedder.
pub struct CorpusBuilder<'a> {
    extractor: &'a dyn DocumentExtractor,
    embedder: &'a dyn Embedder,
    chunking: ChunkingConfig,
    embed_delay: Duration,
    max_input_chars: usize,
}

impl<'a> CorpusBuilder<'a> {
    /// Builder with default chunking, delay, and input budget.
    pub fn new(extractor: &'a dyn DocumentExtractor, embedder: &'a dyn Embedder) -> Self {
        Self {
            extractor,
            embedder,
            chunking: ChunkingConfig::default(),
            embed_delay: DEFAULT_EMBED_DELAY,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }

    /// Overrides the chunking window.
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    /// Overrides the pause between embedding calls.
    pub fn with_embed_delay(mut self, embed_delay: Duration) -> Self {
        self.embed_delay = embed_delay;
        self
    }

    /// Overrides the per-chunk character budget sent to the embedder.
    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars.max(1);
        self
    }

    /// Builds from every matching file in `dir`.
    pub fn build_dir(
        &self,
        dir: &Path,
        extensions: &[String],
    ) -> Result<(KnowledgeBase, BuildReport), RagError> {
        let paths = discover_sources(dir, extensions)?;
        info!(dir = %dir.display(), files = paths.len(), "discovered source files");
        Ok(self.build(&paths))
    }

    /// Builds from an explicit file list; order decides which duplicate wins.
    pub fn build(&self, paths: &[PathBuf]) -> (KnowledgeBase, BuildReport) {
        let (sources, duplicates) = dedupe_sources(paths);
        for dup in &duplicates {
            info!(file = %dup.display(), "skipping duplicate source");
        }
        info!(unique = sources.len(), "processing sources");

        let mut report = BuildReport {
            duplicates_skipped: duplicates,
            ..BuildReport::default()
        };
        let mut chunks = Vec::new();
        let mut embedded_any = false;
        for source in &sources {
            info!(source = %source.key, file = %source.path.display(), "processing source");
            match self.process_source(source, &mut embedded_any) {
                Ok(mut built) => {
                    info!(source = %source.key, chunks = built.len(), "source complete");
                    report.sources_processed += 1;
                    chunks.append(&mut built);
                }
                Err(err) => {
                    warn!(source = %source.key, error = %err, "skipping source");
                    report.failed.push(SourceFailure {
                        source: source.key.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let kb = KnowledgeBase::from_chunks(chunks, Some(self.embedder.model_id().to_string()));
        report.total_chunks = kb.total_chunks;
        info!(
            processed = report.sources_processed,
            duplicates = report.duplicates_skipped.len(),
            failed = report.failed.len(),
            chunks = report.total_chunks,
            "corpus build finished"
        );
        (kb, report)
    }

    fn process_source(
        &self,
        source: &SourceFile,
        embedded_any: &mut bool,
    ) -> Result<Vec<KnowledgeChunk>, SourceError> {
        let document = Document::read(&source.path)?;
        let text = self.extractor.extract(&document)?;
        debug!(
            source = %source.key,
            words = text.split_whitespace().count(),
            "extracted text"
        );

        let mut chunks = chunk_text(&text, &source.key, &self.chunking);
        let total = chunks.len();
        for (idx, chunk) in chunks.iter_mut().enumerate() {
            if *embedded_any && !self.embed_delay.is_zero() {
                thread::sleep(self.embed_delay);
            }
            *embedded_any = true;
            let input = truncate_chars(&chunk.text, self.max_input_chars);
            chunk.embedding = self
                .embedder
                .embed(input)
                .map_err(|source| SourceError::Embed { index: idx, source })?;
            if (idx + 1) % PROGRESS_EVERY == 0 || idx + 1 == total {
                debug!(source = %chunk.source, done = idx + 1, total, "embedded chunks");
            }
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn source_keys_strip_extension_and_upload_suffix() {
        assert_eq!(source_key("doc_1700000000.pdf"), "doc");
        assert_eq!(source_key("cystic-fibrosis_guide_2.pdf"), "cystic-fibrosis_guide");
        assert_eq!(source_key("surfactant.pdf"), "surfactant");
        assert_eq!(source_key("notes_v2.txt"), "notes_v2");
        assert_eq!(source_key("_123.pdf"), "_123");
        assert_eq!(source_key("README"), "README");
        assert_eq!(source_key(".hidden"), ".hidden");
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let paths: Vec<PathBuf> = ["doc_1700000000.pdf", "doc_1700000500.pdf", "other.pdf"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let (unique, dups) = dedupe_sources(&paths);
        let keys: Vec<&str> = unique.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, ["doc", "other"]);
        assert_eq!(unique[0].path, PathBuf::from("doc_1700000000.pdf"));
        assert_eq!(dups, [PathBuf::from("doc_1700000500.pdf")]);
    }

    #[test]
    fn discovers_matching_files_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.pdf", "a.PDF", "c.txt", "d.md"] {
            fs::write(dir.path().join(name), b"x").expect("write");
        }
        fs::create_dir(dir.path().join("nested.pdf")).expect("mkdir");

        let found = discover_sources(dir.path(), &["pdf".to_string()]).expect("discover");
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.PDF", "b.pdf"]);

        let found =
            discover_sources(dir.path(), &["txt".to_string(), "md".to_string()]).expect("discover");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn missing_directory_is_io_error() {
        let err = discover_sources(Path::new("/no/such/dir"), &["pdf".into()]).unwrap_err();
        assert!(matches!(err, RagError::Io { .. }));
    }
}
