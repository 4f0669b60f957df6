use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use doc_extract::{
    DocumentExtractor, GeminiExtractor, LocalFirstExtractor, PlainTextExtractor,
    DEFAULT_EXTRACTION_MODEL, DEFAULT_GEMINI_BASE_URL,
};
use medrag::builder::CorpusBuilder;
use medrag::config::{ChunkingArgs, EmbeddingArgs, DEFAULT_KNOWLEDGE_BASE_PATH};
use medrag::logging::init_tracing;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "medrag-build",
    about = "Extract, chunk, and embed source documents into a knowledge base artifact"
)]
struct BuildCli {
    /// Directory holding the source documents
    #[arg(long, env = "MEDRAG_SOURCE_DIR", default_value = "attached_assets")]
    input_dir: PathBuf,

    /// Where to write the knowledge base artifact
    #[arg(long, env = "MEDRAG_KNOWLEDGE_BASE", default_value = DEFAULT_KNOWLEDGE_BASE_PATH)]
    output: PathBuf,

    /// File extensions to pick up (comma separated)
    #[arg(
        long,
        env = "MEDRAG_SOURCE_EXTENSIONS",
        value_delimiter = ',',
        default_value = "pdf"
    )]
    extensions: Vec<String>,

    /// Milliseconds to wait between embedding calls
    #[arg(long, env = "MEDRAG_EMBED_DELAY_MS", default_value_t = 200)]
    embed_delay_ms: u64,

    /// Multimodal model used to read non-text documents
    #[arg(long, env = "MEDRAG_EXTRACTION_MODEL", default_value = DEFAULT_EXTRACTION_MODEL)]
    extraction_model: String,

    /// API root of the extraction service
    #[arg(long, env = "MEDRAG_GEMINI_BASE_URL", default_value = DEFAULT_GEMINI_BASE_URL)]
    extraction_base_url: String,

    /// Max seconds to wait for each extraction request
    #[arg(long, env = "MEDRAG_EXTRACTION_TIMEOUT_SECS", default_value_t = 120)]
    extraction_timeout_secs: u64,

    /// Optional path for a JSON build report
    #[arg(long)]
    report: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(flatten)]
    chunking: ChunkingArgs,

    #[command(flatten)]
    embedding: EmbeddingArgs,
}

fn main() -> Result<()> {
    let cli = BuildCli::parse();
    init_tracing(cli.verbose);

    let chunking = cli.chunking.config().context("invalid chunking settings")?;
    let embedder = cli
        .embedding
        .build_embedder()
        .context("failed to configure the embedding client")?;
    let extractor = build_extractor(&cli)?;

    let builder = CorpusBuilder::new(extractor.as_ref(), embedder.as_ref())
        .with_chunking(chunking)
        .with_embed_delay(Duration::from_millis(cli.embed_delay_ms))
        .with_max_input_chars(cli.embedding.max_input_chars);
    let (kb, report) = builder
        .build_dir(&cli.input_dir, &cli.extensions)
        .with_context(|| format!("failed to scan {}", cli.input_dir.display()))?;

    if kb.total_chunks == 0 {
        bail!(
            "no chunks were produced from {}; refusing to overwrite {}",
            cli.input_dir.display(),
            cli.output.display()
        );
    }
    kb.write_to(&cli.output)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;
    let size_kb = fs::metadata(&cli.output)
        .map(|meta| meta.len() as f64 / 1024.0)
        .unwrap_or_default();
    info!(
        output = %cli.output.display(),
        chunks = kb.total_chunks,
        sources = kb.sources.len(),
        size_kb = %format!("{size_kb:.1}"),
        "knowledge base written"
    );

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn build_extractor(cli: &BuildCli) -> Result<Box<dyn DocumentExtractor>> {
    let key = cli.embedding.gemini_api_key.as_deref().unwrap_or_default();
    if key.trim().is_empty() {
        warn!("GEMINI_API_KEY is not set; only text documents can be extracted");
        return Ok(Box::new(PlainTextExtractor));
    }
    let remote = GeminiExtractor::new(
        key,
        &cli.extraction_base_url,
        &cli.extraction_model,
        Duration::from_secs(cli.extraction_timeout_secs.max(1)),
    )
    .context("failed to configure the extraction client")?;
    Ok(Box::new(LocalFirstExtractor::new(remote)))
}
