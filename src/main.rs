//! Résumé assistant - chat with a single PDF about its author
//!
//! Serves a one-page chat UI backed by a per-session state machine that
//! retrieves passages from the résumé and asks a chat model to answer.

mod api;
mod config;
mod document;
mod embeddings;
mod index;
mod llm;
mod persona;
mod responder;
mod runtime;
mod state_machine;

use api::{create_router, AppState};
use config::AppConfig;
use document::TextSplitter;
use embeddings::OpenAIEmbedder;
use index::DocumentIndexer;
use llm::{LoggingService, OpenAIService};
use persona::PromptTemplate;
use responder::{GenerationSettings, RagResponder};
use runtime::{SessionManager, SessionSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const REAPER_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Merge .env before anything reads the environment, RUST_LOG included
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resume_assistant=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .init();

    match dotenv {
        Ok(path) => tracing::info!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable environment file"),
    }

    // Configuration problems stop the server before any indexing
    let config = AppConfig::from_env()
        .inspect_err(|e| tracing::error!(error = %e, "Invalid configuration"))?;
    tracing::info!(config = ?config, "Configuration loaded");

    let template = PromptTemplate::load(config.persona_template_path.as_deref())
        .inspect_err(|e| tracing::error!(error = %e, "Invalid persona template"))?;

    if config.tracing.api_key.is_some() {
        tracing::info!(
            project = %config.tracing.project,
            "Run tracing key present; answers are tagged with the project label"
        );
    }
    if !config.resume_path.exists() {
        tracing::warn!(
            path = %config.resume_path.display(),
            "Source document not found; sessions will not be able to answer"
        );
    }

    // Model clients
    let embedder = Arc::new(OpenAIEmbedder::new(
        config.openai_api_key.clone(),
        config.embedding_model.clone(),
        &config.openai_base_url,
        config.request_timeout,
    )?);
    let chat = OpenAIService::new(
        config.openai_api_key.clone(),
        config.chat_model.clone(),
        &config.openai_base_url,
        config.request_timeout,
    )?;
    let llm = Arc::new(LoggingService::new(Arc::new(chat)));

    // Session plumbing
    let splitter = TextSplitter::new(config.chunking)?;
    let indexer = DocumentIndexer::new(config.resume_path.clone(), splitter, embedder.clone());
    let responder = RagResponder::new(
        embedder,
        llm,
        template,
        GenerationSettings {
            top_k: config.top_k,
            temperature: config.chat_temperature,
            max_tokens: config.chat_max_tokens,
        },
        config.tracing.project.clone(),
    );
    let sessions = SessionManager::new(
        Arc::new(indexer),
        Arc::new(responder),
        SessionSettings {
            max_attempts: config.max_attempts,
            idle_timeout: config.session_idle_timeout,
            ..SessionSettings::default()
        },
    );
    let sessions = Arc::new(sessions);
    SessionManager::spawn_reaper(&sessions, REAPER_INTERVAL);

    let state = AppState::new(sessions);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Résumé assistant listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
