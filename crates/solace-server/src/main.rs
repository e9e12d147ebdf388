mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use solace_api::tokens::TokenSettings;
use solace_api::{AppStateInner, router};
use solace_chat::conversation::run_sweep_loop;
use solace_chat::{
    CompletionClient, ConversationStore, CrisisDetector, Dispatcher, HttpCompletionBackend,
};
use solace_db::Database;

use crate::config::Config;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solace=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Fix your environment or .env file and restart.");
            std::process::exit(1);
        }
    };
    if config.development {
        warn!("Development mode: internal error details are returned to clients");
    }

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    let detector = match &config.crisis_keywords_path {
        Some(path) => {
            info!("Loading crisis keywords from {}", path.display());
            CrisisDetector::load_from_file(path)?
        }
        None => CrisisDetector::default(),
    };

    let backend = HttpCompletionBackend::new(config.llm.clone())?;
    if !backend.is_configured() {
        warn!("SOLACE_LLM_API_KEY is not set; every chat reply will use the fallback pool");
    }
    let completion = CompletionClient::new(Arc::new(backend), config.llm.timeout);

    // Idle conversations are pruned in the background
    let conversations = ConversationStore::new();
    tokio::spawn(run_sweep_loop(
        conversations.clone(),
        config.conversation_idle,
        SWEEP_INTERVAL,
    ));

    let dispatcher = Dispatcher::new(conversations, completion, detector, db.clone());

    let state = Arc::new(AppStateInner {
        db,
        dispatcher,
        tokens: TokenSettings::new(
            config.jwt_secret.clone(),
            config.access_token_ttl,
            config.refresh_token_ttl,
        ),
        started_at: Utc::now(),
        development: config.development,
    });

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Solace server listening on {}", addr);
    info!(
        "Model: {} via {}, conversation idle timeout {} min",
        config.llm.model,
        config.llm.api_url,
        config.conversation_idle.num_minutes()
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
