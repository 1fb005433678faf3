//! idfuse-orchestrator - identity fusion service
//!
//! Serves `POST /identify-and-answer`, `GET /health` and `GET /metrics/*`.
//! Configuration comes from the command line, the environment and an
//! optional TOML file, in that order of precedence.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use idfuse_common::config::TomlConfig;
use idfuse_common::events::EventBus;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use idfuse_orchestrator::config::OrchestratorSettings;
use idfuse_orchestrator::recorder::Recorder;
use idfuse_orchestrator::registry::ServiceRegistry;
use idfuse_orchestrator::{build_router, AppState, Orchestrator};

/// Broadcast capacity; a few requests' worth of service-call events
const EVENT_BUS_CAPACITY: usize = 1024;

const RECORDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Command-line arguments for idfuse-orchestrator
#[derive(Parser, Debug)]
#[command(name = "idfuse-orchestrator")]
#[command(about = "Identity fusion over parallel face-verification backends")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "IDFUSE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "IDFUSE_PORT")]
    port: Option<u16>,

    /// SQLite database for service and access logs
    #[arg(short, long, env = "IDFUSE_DATABASE")]
    database: Option<PathBuf>,

    /// Question-answering backend base URL
    #[arg(long, env = "IDFUSE_CONTEXT_URL")]
    context_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    config.apply_env_overrides();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = args.database {
        config.database_path = Some(database);
    }
    if let Some(url) = args.context_url {
        config.context_url = Some(url);
    }
    config.validate().context("Invalid configuration")?;

    // RUST_LOG wins over the config file level
    let default_filter = format!(
        "idfuse_orchestrator={level},idfuse_common={level},tower_http={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting idfuse-orchestrator v{}", env!("CARGO_PKG_VERSION"));

    let registry = ServiceRegistry::new(config.services.clone())
        .context("Invalid verification service registry")?;
    info!(
        active = registry.active_count(),
        total = registry.len(),
        "Service registry loaded"
    );
    if registry.active_count() == 0 {
        warn!("No active verification services; every request will be unknown");
    }

    let settings = OrchestratorSettings::from_toml(&config)?;
    match &settings.context_url {
        Some(url) => info!("Context backend: {}", url),
        None => info!("No context backend configured"),
    }

    let db_path = config.database_path_or_default();
    info!("Database: {}", db_path.display());
    let db_pool = idfuse_common::db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let recorder = Recorder::spawn(db_pool.clone(), &event_bus);

    let orchestrator = Orchestrator::from_settings(registry, &settings, event_bus)
        .context("Failed to build orchestrator")?;

    let state = AppState::new(Arc::new(orchestrator), db_pool, config.max_image_bytes);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Router (and with it the last bus sender) is gone; let the recorder drain
    match tokio::time::timeout(RECORDER_DRAIN_TIMEOUT, recorder).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Recorder task ended abnormally: {}", e),
        Err(_) => warn!("Recorder did not drain within {:?}", RECORDER_DRAIN_TIMEOUT),
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
