use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use doc_extract::{Document, DocumentExtractor, ExtractError, PlainTextExtractor};
use medrag::{
    ChunkingConfig, CorpusBuilder, EmbedError, Embedder, KnowledgeBase, KnowledgeBaseLoader,
    RagService, RetrievalOptions,
};
use pretty_assertions::assert_eq;

/// Serves canned text per file name and records which files were read.
#[derive(Default)]
struct CannedExtractor {
    seen: Mutex<Vec<String>>,
}

impl DocumentExtractor for CannedExtractor {
    fn extract(&self, document: &Document) -> Result<String, ExtractError> {
        self.seen
            .lock()
            .expect("lock")
            .push(document.name.clone());
        match document.name.as_str() {
            name if name.starts_with("broken") => Err(ExtractError::Empty(name.to_string())),
            name if name.starts_with("lungs") => Ok(words("surfactant", 60)),
            name if name.starts_with("flaky") => Ok(words("outage", 60)),
            _ => Ok(words("asthma", 120)),
        }
    }
}

struct TopicEmbedder;

impl Embedder for TopicEmbedder {
    fn model_id(&self) -> &str {
        "topic-embedding"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.starts_with("outage") {
            return Err(EmbedError::EmptyEmbedding);
        }
        Ok(if text.starts_with("asthma") {
            vec![1.0, 0.0, 0.0]
        } else {
            vec![0.0, 1.0, 0.0]
        })
    }
}

fn words(topic: &str, count: usize) -> String {
    (0..count)
        .map(|i| format!("{topic}{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn touch(dir: &Path, names: &[&str]) {
    for name in names {
        fs::write(dir.join(name), b"%PDF-1.4").expect("write source");
    }
}

fn small_builder<'a>(
    extractor: &'a dyn DocumentExtractor,
    embedder: &'a dyn Embedder,
) -> CorpusBuilder<'a> {
    CorpusBuilder::new(extractor, embedder)
        .with_chunking(ChunkingConfig::new(50, 10, 5).expect("chunking"))
        .with_embed_delay(Duration::ZERO)
}

#[test]
fn deduplicates_by_stable_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    touch(
        dir.path(),
        &["doc_1700000500.pdf", "doc_1700000000.pdf", "notes.txt"],
    );
    let extractor = CannedExtractor::default();
    let builder = small_builder(&extractor, &TopicEmbedder);

    let (kb, report) = builder
        .build_dir(dir.path(), &["pdf".to_string()])
        .expect("build");

    assert_eq!(*extractor.seen.lock().expect("lock"), ["doc_1700000000.pdf"]);
    assert_eq!(report.duplicates_skipped.len(), 1);
    assert!(report.duplicates_skipped[0].ends_with("doc_1700000500.pdf"));
    assert_eq!(kb.sources, ["doc"]);
    // 120 words, windows of 50 advancing by 40: 0..50, 40..90, 80..120.
    assert_eq!(kb.total_chunks, 3);
    let ids: Vec<&str> = kb.chunks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["doc_chunk_0", "doc_chunk_1", "doc_chunk_2"]);
    assert!(kb.chunks.iter().all(|c| c.embedding == [1.0, 0.0, 0.0]));
    assert_eq!(kb.embedding_model.as_deref(), Some("topic-embedding"));
}

#[test]
fn failed_sources_are_skipped_whole() {
    let dir = tempfile::tempdir().expect("tempdir");
    touch(
        dir.path(),
        &["asthma.pdf", "broken.pdf", "flaky_12.pdf", "lungs_3.pdf"],
    );
    let extractor = CannedExtractor::default();
    let (kb, report) = small_builder(&extractor, &TopicEmbedder)
        .build_dir(dir.path(), &["pdf".to_string()])
        .expect("build");

    assert_eq!(kb.sources, ["asthma", "lungs"]);
    assert_eq!(report.sources_processed, 2);
    let failed: Vec<&str> = report.failed.iter().map(|f| f.source.as_str()).collect();
    assert_eq!(failed, ["broken", "flaky"]);
    assert!(report.failed[1].reason.contains("embedding chunk 0"));
    assert!(kb.chunks.iter().all(|c| c.source != "flaky"));
    assert_eq!(report.total_chunks, kb.total_chunks);
    kb.validate().expect("consistent artifact");
}

#[test]
fn written_artifact_loads_and_answers_queries() {
    let src = tempfile::tempdir().expect("tempdir");
    fs::write(src.path().join("asthma_1700000000.txt"), words("asthma", 40)).expect("write");
    fs::write(src.path().join("surfactant.txt"), words("surfactant", 40)).expect("write");
    let out = tempfile::tempdir().expect("tempdir");
    let artifact = out.path().join("assets").join("medical-knowledge.json");

    let (kb, _) = small_builder(&PlainTextExtractor, &TopicEmbedder)
        .build_dir(src.path(), &["txt".to_string()])
        .expect("build");
    kb.write_to(&artifact).expect("write artifact");

    let raw = fs::read_to_string(&artifact).expect("read back");
    assert!(raw.contains("\n  \"version\": \"1.0\""));
    assert!(raw.contains("\"totalChunks\": 2"));
    let reparsed = KnowledgeBase::from_slice(raw.as_bytes()).expect("reparse");
    assert_eq!(reparsed.sources, ["asthma", "surfactant"]);

    let service = RagService::new(KnowledgeBaseLoader::from_path(&artifact), Box::new(TopicEmbedder));
    let results = service.retrieve_relevant_context("asthma attack", RetrievalOptions::default());
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.id, "asthma_chunk_0");
}
