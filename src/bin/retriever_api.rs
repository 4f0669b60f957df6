use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use medrag::config::{EmbeddingArgs, RetrievalArgs};
use medrag::context::{render_context, render_context_with_citations};
use medrag::logging::init_tracing;
use medrag::{Citation, RagService, RetrievalOptions};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "medrag-retriever",
    about = "HTTP API that serves grounding context from a local knowledge base"
)]
struct ApiCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "MEDRAG_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Maximum top-k allowed per request.
    #[arg(long, env = "MEDRAG_MAX_TOP_K", default_value_t = 12)]
    max_top_k: usize,

    /// Debug-level logging.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(flatten)]
    retrieval: RetrievalArgs,

    #[command(flatten)]
    embedding: EmbeddingArgs,
}

#[derive(Clone)]
struct AppState {
    service: Arc<RagService>,
    default_top_k: usize,
    max_top_k: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    min_similarity: Option<f32>,
    #[serde(default)]
    citations: bool,
}

#[derive(Debug, Serialize)]
struct ContextResponse {
    context: String,
    citations: Vec<Citation>,
    meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponseMeta {
    top_k: usize,
    latency_ms: f64,
    retrieved: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    total_chunks: usize,
    sources: Vec<String>,
    available: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ApiCli::parse();
    init_tracing(cli.verbose);

    let service = cli
        .retrieval
        .build_service(&cli.embedding)
        .context("failed to configure the query embedder")?;
    let service = Arc::new(service);
    let loader = Arc::clone(&service);
    let loaded = tokio::task::spawn_blocking(move || loader.load_knowledge_base())
        .await
        .context("knowledge base load task failed")?;
    if !loaded {
        warn!(
            path = %cli.retrieval.knowledge_base.display(),
            "serving without a knowledge base; every context will be empty"
        );
    }

    let state = AppState {
        service,
        default_top_k: cli.retrieval.top_k.max(1),
        max_top_k: cli.max_top_k.max(1),
    };
    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("medrag-retriever listening on http://{addr}");
    axum::serve(listener, router(state))
        .await
        .context("server shutdown")?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/stats", get(stats_handler))
        .route("/v1/context", post(context_handler))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let available = state.service.is_knowledge_base_available();
    let stats = state.service.knowledge_base_stats();
    Json(StatsResponse {
        total_chunks: stats.as_ref().map_or(0, |s| s.total_chunks),
        sources: stats.map(|s| s.sources).unwrap_or_default(),
        available,
    })
}

async fn context_handler(
    State(state): State<AppState>,
    Json(request): Json<ContextRequest>,
) -> Result<Json<ContextResponse>, (StatusCode, Json<ErrorBody>)> {
    if request.query.trim().is_empty() {
        return Err(error_body(
            StatusCode::BAD_REQUEST,
            "query text must not be empty",
        ));
    }
    let top_k = request
        .top_k
        .unwrap_or(state.default_top_k)
        .clamp(1, state.max_top_k);
    let options = RetrievalOptions {
        top_k,
        min_similarity: request
            .min_similarity
            .unwrap_or_else(|| state.service.min_similarity()),
    };

    let start = Instant::now();
    let service = Arc::clone(&state.service);
    let (context, citations, retrieved) = tokio::task::spawn_blocking(move || {
        let results = service.retrieve_relevant_context(&request.query, options);
        let retrieved = results.len();
        if request.citations {
            let rag = render_context_with_citations(&results);
            (rag.context, rag.citations, retrieved)
        } else {
            (render_context(&results), Vec::new(), retrieved)
        }
    })
    .await
    .map_err(|err| {
        error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("retrieval task failed: {err}"),
        )
    })?;

    Ok(Json(ContextResponse {
        context,
        citations,
        meta: ResponseMeta {
            top_k,
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            retrieved,
        },
    }))
}

fn error_body(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}
