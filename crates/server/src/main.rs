use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vidtune_core::converter::{Converter, FfmpegConverter};
use vidtune_core::fetcher::HttpFetcher;
use vidtune_core::source::HttpMediaSource;
use vidtune_core::uploader::HttpUploader;
use vidtune_core::{load_config, validate_config, BatchOrchestrator, Collaborators};

use vidtune_server::api::create_router;
use vidtune_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("VIDTUNE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        max_concurrency = config.batch.max_concurrency,
        scratch_dir = %config.batch.scratch_dir.display(),
        "Configuration loaded successfully"
    );

    tokio::fs::create_dir_all(&config.batch.scratch_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create scratch directory {:?}",
                config.batch.scratch_dir
            )
        })?;

    // Collaborators
    let source = HttpMediaSource::new(config.source.clone())
        .context("Failed to create upstream source client")?;
    info!("Upstream source: {}", config.source.base_url);

    let fetcher =
        HttpFetcher::new(config.download.clone()).context("Failed to create media fetcher")?;

    let converter = FfmpegConverter::new(config.converter.clone());
    match converter.validate().await {
        Ok(()) => info!("ffmpeg available at {}", config.converter.ffmpeg_path.display()),
        // Items will fail at the transcode stage; the API stays up.
        Err(e) => warn!("ffmpeg check failed: {}", e),
    }

    let uploader =
        HttpUploader::new(config.uploader.clone()).context("Failed to create uploader")?;
    info!("Upload destination: {}", config.uploader.base_url);

    let collaborators = Collaborators {
        source: Arc::new(source),
        fetcher: Arc::new(fetcher),
        converter: Arc::new(converter),
        uploader: Arc::new(uploader),
    };

    // Orchestrator and reaper
    let orchestrator = BatchOrchestrator::from_config(&config, collaborators);
    let reaper = orchestrator.spawn_reaper();
    info!("Batch orchestrator ready");

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), orchestrator.clone()));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    orchestrator.shutdown();
    if let Err(e) = reaper.await {
        warn!("Reaper task ended abnormally: {}", e);
    }
    info!("Orchestrator stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
