use anyhow::{bail, Context, Result};
use clap::Parser;
use medrag::config::{EmbeddingArgs, RetrievalArgs};
use medrag::logging::init_tracing;
use medrag::{cited_sources, RagContext};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "medrag-query",
    about = "Retrieve grounding context for a question from a local knowledge base"
)]
struct QueryCli {
    /// Question to retrieve context for
    #[arg(long)]
    query: String,

    /// Render `[N]` markers and print the citation list
    #[arg(long, default_value_t = false)]
    citations: bool,

    /// Print `{context, citations}` as JSON instead of text
    #[arg(long, default_value_t = false)]
    json: bool,

    /// A model answer to check for `[N]` markers against the citations
    #[arg(long)]
    answer: Option<String>,

    /// Debug-level logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(flatten)]
    retrieval: RetrievalArgs,

    #[command(flatten)]
    embedding: EmbeddingArgs,
}

#[derive(Serialize)]
struct QueryOutput<'a> {
    query: &'a str,
    #[serde(flatten)]
    rag: &'a RagContext,
}

fn main() -> Result<()> {
    let cli = QueryCli::parse();
    init_tracing(cli.verbose);

    let service = cli
        .retrieval
        .build_service(&cli.embedding)
        .context("failed to configure the query embedder")?;
    if !service.load_knowledge_base() {
        bail!(
            "knowledge base {} could not be loaded",
            cli.retrieval.knowledge_base.display()
        );
    }
    if !service.is_knowledge_base_available() {
        bail!("knowledge base {} is empty", cli.retrieval.knowledge_base.display());
    }

    let rag = if cli.citations || cli.json || cli.answer.is_some() {
        service.rag_context_with_citations(&cli.query, cli.retrieval.top_k)
    } else {
        RagContext {
            context: service.rag_context(&cli.query, cli.retrieval.top_k),
            citations: Vec::new(),
        }
    };

    if cli.json {
        let output = QueryOutput {
            query: &cli.query,
            rag: &rag,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("failed to serialize output")?
        );
        return Ok(());
    }

    if rag.context.is_empty() {
        println!("no sources matched the query");
        return Ok(());
    }
    println!("--- Retrieved Context ---\n{}\n", rag.context);
    if cli.citations {
        println!("--- Citations ---");
        for citation in &rag.citations {
            println!(
                "{} {} ({}%)\n    {}",
                citation.id, citation.source_title, citation.similarity, citation.excerpt
            );
        }
    }
    if let Some(answer) = &cli.answer {
        let cited = cited_sources(answer, &rag.citations);
        println!("\n--- Cited In Answer ---");
        if cited.is_empty() {
            println!("(none)");
        }
        for citation in cited {
            println!("{} {}", citation.id, citation.source_title);
        }
    }
    Ok(())
}
