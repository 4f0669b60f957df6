use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use doc_extract::{
    Document, DocumentExtractor, ExtractError, GeminiExtractor, LocalFirstExtractor,
    PlainTextExtractor, DEFAULT_EXTRACTION_MODEL, DEFAULT_GEMINI_BASE_URL,
};
use tracing_subscriber::EnvFilter;

/// Extract the text of one document and print it to stdout.
#[derive(Debug, Parser)]
#[command(name = "doc-extract", version)]
struct Cli {
    /// Document to read; `-` or nothing reads stdin as plain text.
    input: Option<PathBuf>,

    /// Overrides the MIME type guessed from the file extension.
    #[arg(long)]
    mime: Option<String>,

    /// API key for the remote extraction model.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// API root of the extraction service.
    #[arg(long, env = "MEDRAG_GEMINI_BASE_URL", default_value = DEFAULT_GEMINI_BASE_URL)]
    base_url: String,

    /// Multimodal model used for non-text documents.
    #[arg(long, env = "MEDRAG_EXTRACTION_MODEL", default_value = DEFAULT_EXTRACTION_MODEL)]
    model: String,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 120, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_secs: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("{}: {err}", env!("CARGO_PKG_NAME"));
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), ExtractError> {
    let mut document = match cli.input.as_deref() {
        Some(path) if path.as_os_str() != "-" => Document::read(path)?,
        _ => read_stdin()?,
    };
    if let Some(mime) = cli.mime {
        document.mime_type = mime;
    }

    let text = if document.is_text() {
        PlainTextExtractor.extract(&document)?
    } else {
        let api_key = cli.api_key.unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(ExtractError::Config(format!(
                "GEMINI_API_KEY is required to extract {} documents",
                document.mime_type
            )));
        }
        let remote = GeminiExtractor::new(
            &api_key,
            &cli.base_url,
            &cli.model,
            Duration::from_secs(cli.timeout_secs),
        )?;
        LocalFirstExtractor::new(remote).extract(&document)?
    };
    println!("{text}");
    Ok(())
}

fn read_stdin() -> Result<Document, ExtractError> {
    let mut buf = Vec::new();
    io::stdin()
        .read_to_end(&mut buf)
        .map_err(|source| ExtractError::Io {
            path: "<stdin>".into(),
            source,
        })?;
    Ok(Document::new("<stdin>", "text/plain", buf))
}
