// Sightline perception server

use anyhow::Context;
use clap::Parser;
use sightline_core::SightlineConfig;
use sightline_eye::PipelineOrchestrator;
use sightline_server::{create_router, remote, ApiState, LocalStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sightline-server")]
#[command(about = "Perception fusion API for surveillance, assistive and self-driving modes")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides configuration)
    #[arg(long, short)]
    port: Option<u16>,

    /// Directory for saved frames and the record log
    #[arg(long)]
    upload_dir: Option<String>,
}

fn load_config(cli: &Cli) -> anyhow::Result<SightlineConfig> {
    let mut config = match &cli.config {
        Some(path) => SightlineConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => SightlineConfig::default(),
    };
    config.apply_env();
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(dir) = &cli.upload_dir {
        config.server.upload_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Starting Sightline...");

    let registry = remote::build_registry(&config.models).context("failed to build model clients")?;
    let loaded = registry.loaded_detectors();
    if loaded.is_empty() {
        warn!("No detector endpoints configured; detections will be empty");
    }
    for (mode, label) in &loaded {
        info!("  {} -> {}", mode, label);
    }

    let store = LocalStore::open(&config.server.upload_dir)
        .await
        .with_context(|| format!("failed to open upload dir {}", config.server.upload_dir))?;
    info!("Upload directory: {}", store.upload_dir().display());

    let orchestrator =
        PipelineOrchestrator::new(Arc::new(registry), config.pipeline.clone(), config.free_space.clone());
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid bind address")?;
    let state = ApiState::new(orchestrator, Arc::new(store), config);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("HTTP server failed")?;

    info!("Sightline stopped");
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}
