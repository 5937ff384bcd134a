//! Chat relay - conversational message relay with asynchronous replies
//!
//! Accepts user messages, enforces a per-conversation state machine, and
//! hands reply generation to background workers. Callers discover replies
//! by long-polling.

mod access;
mod api;
mod config;
mod db;
mod dispatch;
mod error;
mod lifecycle;
mod llm;
mod poll;
mod reply;
mod seed;
mod sequence;
mod service;
mod state_machine;
#[cfg(test)]
mod testing;

use access::RoleAccessGate;
use api::{create_router, AppState};
use config::Config;
use db::Database;
use dispatch::{spawn_workers, ChannelJobQueue, JobQueue, ReplyDispatcher, ReplyWorker};
use lifecycle::Lifecycle;
use llm::{LlmConfig, ModelRegistry};
use poll::PollWaiter;
use reply::{AutoReplyGenerator, LlmReplyGenerator, ReplyGenerator};
use sequence::ConversationLocks;
use service::ChatService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_relay=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    if let Some(seed_file) = &config.seed_file {
        let report = seed::load_file(&db, seed_file)?;
        tracing::info!(
            path = %seed_file.display(),
            principals = report.principals,
            scenarios = report.scenarios,
            llm_models = report.llm_models,
            "Seed applied"
        );
    }

    let generator = reply_generator(&db, &config.llm);

    // Core
    let lifecycle = Arc::new(Lifecycle::new(
        db.clone(),
        ConversationLocks::new(config.lock_timeout),
    ));
    let queue = Arc::new(ChannelJobQueue::new(config.queue_capacity));
    let shutdown = CancellationToken::new();

    let worker = Arc::new(ReplyWorker::new(
        Arc::clone(&lifecycle),
        generator,
        config.retry,
    ));
    let workers = spawn_workers(
        config.workers,
        Arc::clone(&queue) as Arc<dyn JobQueue>,
        worker,
        shutdown.clone(),
    );

    let poller = PollWaiter::new(db.clone(), lifecycle.reply_signal(), config.poll);
    let service = ChatService::new(
        lifecycle,
        ReplyDispatcher::new(Arc::clone(&queue) as Arc<dyn JobQueue>),
        poller,
        Arc::new(RoleAccessGate::new(db.clone())),
    );
    let state = AppState::new(Arc::new(service), db, shutdown.clone());

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, workers = config.workers, "Chat relay listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Stop workers; queued jobs are dropped, their conversations stay Pending
    shutdown.cancel();
    queue.close().await;
    for handle in workers {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Reply worker did not exit cleanly");
        }
    }
    tracing::info!("Chat relay stopped");

    Ok(())
}

/// LLM-backed replies when a provider is configured, auto-replies otherwise
fn reply_generator(db: &Database, llm: &LlmConfig) -> Arc<dyn ReplyGenerator> {
    let registry = Arc::new(ModelRegistry::new(llm));
    if registry.has_models() {
        tracing::info!(
            models = ?registry.available_models(),
            default = %registry.default_model_id(),
            "LLM registry initialized"
        );
        Arc::new(LlmReplyGenerator::new(db.clone(), registry))
    } else {
        tracing::warn!("No LLM API keys configured, using auto-replies. Set ANTHROPIC_API_KEY or LLM_GATEWAY.");
        Arc::new(AutoReplyGenerator)
    }
}

/// Resolves on ctrl-c, cancelling `shutdown` so in-flight polls return
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
