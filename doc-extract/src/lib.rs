//! Best-effort text extraction from source documents.
//!
//! Text-like files are decoded locally. Anything else (PDFs, images, office
//! formats) is handed to a remote document-understanding model, see
//! [`GeminiExtractor`].

use std::fs;
use std::path::Path;

use thiserror::Error;

mod gemini;

pub use gemini::{GeminiExtractor, DEFAULT_EXTRACTION_MODEL, DEFAULT_GEMINI_BASE_URL};

/// Errors raised while turning a document into text.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The document could not be read from disk.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The extractor cannot handle this MIME type.
    #[error("unsupported document type `{0}`")]
    UnsupportedType(String),
    /// Network-level failure talking to the extraction service.
    #[error("extraction request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The extraction service answered with a non-success status.
    #[error("extraction service returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The extraction service answered with an unexpected payload.
    #[error("malformed extraction response: {0}")]
    Parse(String),
    /// Extraction produced no text.
    #[error("no text extracted from {0}")]
    Empty(String),
    /// The extractor is misconfigured.
    #[error("invalid extractor configuration: {0}")]
    Config(String),
}

/// A source document held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File name, used in diagnostics.
    pub name: String,
    /// MIME essence, e.g. `application/pdf`.
    pub mime_type: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl Document {
    /// Wraps in-memory bytes.
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Reads a file and guesses its MIME type from the extension.
    pub fn read(path: &Path) -> Result<Self, ExtractError> {
        let bytes = fs::read(path).map_err(|source| ExtractError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            name,
            mime_type,
            bytes,
        })
    }

    /// `text/*` documents can be decoded without a remote service.
    pub fn is_text(&self) -> bool {
        self.mime_type.starts_with("text/")
    }
}

/// Turns a document into plain text.
pub trait DocumentExtractor: Send + Sync {
    /// Extracts the document's text; an empty result is an error.
    fn extract(&self, document: &Document) -> Result<String, ExtractError>;
}

/// Decodes `text/*` documents as UTF-8, replacing invalid sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl DocumentExtractor for PlainTextExtractor {
    fn extract(&self, document: &Document) -> Result<String, ExtractError> {
        if !document.is_text() {
            return Err(ExtractError::UnsupportedType(document.mime_type.clone()));
        }
        let text = String::from_utf8_lossy(&document.bytes);
        let text = text.trim_start_matches('\u{feff}').trim();
        if text.is_empty() {
            return Err(ExtractError::Empty(document.name.clone()));
        }
        Ok(text.to_string())
    }
}

/// Decodes text locally and sends everything else to `remote`.
#[derive(Debug, Clone)]
pub struct LocalFirstExtractor<R> {
    local: PlainTextExtractor,
    remote: R,
}

impl<R: DocumentExtractor> LocalFirstExtractor<R> {
    /// Wraps a remote extractor.
    pub fn new(remote: R) -> Self {
        Self {
            local: PlainTextExtractor,
            remote,
        }
    }
}

impl<R: DocumentExtractor> DocumentExtractor for LocalFirstExtractor<R> {
    fn extract(&self, document: &Document) -> Result<String, ExtractError> {
        if document.is_text() {
            tracing::debug!(name = %document.name, "decoding text document locally");
            self.local.extract(document)
        } else {
            self.remote.extract(document)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRemote(AtomicUsize);

    impl DocumentExtractor for CountingRemote {
        fn extract(&self, _document: &Document) -> Result<String, ExtractError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok("remote text".into())
        }
    }

    #[test]
    fn reads_files_with_guessed_mime() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = dir.path().join("asthma_1700000000.pdf");
        fs::write(&pdf, b"%PDF-1.4").expect("write");
        let doc = Document::read(&pdf).expect("read");
        assert_eq!(doc.name, "asthma_1700000000.pdf");
        assert_eq!(doc.mime_type, "application/pdf");
        assert!(!doc.is_text());

        let notes = dir.path().join("notes.txt");
        fs::write(&notes, "hello").expect("write");
        assert!(Document::read(&notes).expect("read").is_text());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Document::read(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }

    #[test]
    fn plain_text_trims_and_rejects_empty() {
        let doc = Document::new("a.txt", "text/plain", "\u{feff}  Lungs exchange gas.\n".into());
        assert_eq!(
            PlainTextExtractor.extract(&doc).expect("text"),
            "Lungs exchange gas."
        );

        let blank = Document::new("b.txt", "text/plain", b"  \n ".to_vec());
        assert!(matches!(
            PlainTextExtractor.extract(&blank),
            Err(ExtractError::Empty(_))
        ));

        let pdf = Document::new("c.pdf", "application/pdf", Vec::new());
        assert!(matches!(
            PlainTextExtractor.extract(&pdf),
            Err(ExtractError::UnsupportedType(_))
        ));
    }

    #[test]
    fn local_first_only_calls_remote_for_binary_documents() {
        let extractor = LocalFirstExtractor::new(CountingRemote(AtomicUsize::new(0)));
        let md = Document::new("guide.md", "text/markdown", b"# Surfactant".to_vec());
        assert_eq!(extractor.extract(&md).expect("md"), "# Surfactant");
        assert_eq!(extractor.remote.0.load(Ordering::SeqCst), 0);

        let pdf = Document::new("guide.pdf", "application/pdf", b"%PDF".to_vec());
        assert_eq!(extractor.extract(&pdf).expect("pdf"), "remote text");
        assert_eq!(extractor.remote.0.load(Ordering::SeqCst), 1);
    }
}
