//! Brain Daemon
//!
//! Standalone server process for BMO's brain. Face displays connect over
//! WebSocket, send `input` events, and receive the phase, text, emotion and
//! end-of-speech events for every turn.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default address (0.0.0.0:8765)
//! brain-daemon
//!
//! # Custom address, echo mode (no text producer)
//! brain-daemon --bind 127.0.0.1:9000 --producer none
//!
//! # With verbose logging
//! RUST_LOG=debug brain-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `BRAIN_BIND`: WebSocket bind address
//! - `BRAIN_PRODUCER`: `openai`, `ollama` or `none`
//! - `BRAIN_MODEL` / `OPENAI_MODEL`: model name
//! - `OPENAI_API_KEY`, `OPENAI_BASE_URL`: OpenAI-compatible endpoint
//! - `OLLAMA_HOST`, `OLLAMA_PORT`: Ollama server
//! - `BRAIN_CONTRACT`: path to the shared face contract
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: Graceful shutdown

mod server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use brain_core::{
    default_config_path, load_config_from_path, Brain, BrainConfig, ConfigOverrides, ProducerKind,
};

use crate::server::WsServer;

/// How long the turn worker gets to finish its current turn on shutdown
const WORKER_GRACE: Duration = Duration::from_secs(5);

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "brain-daemon", version, about = "WebSocket brain for BMO face displays")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "BRAIN_BIND")]
    bind: Option<String>,

    /// Configuration file (defaults to ~/.config/bmo/brain.toml)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Text producer: openai, ollama or none
    #[arg(long)]
    producer: Option<ProducerKind>,

    /// Model name passed to the producer
    #[arg(long)]
    model: Option<String>,

    /// Face contract JSON file
    #[arg(long)]
    contract: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref bind) = self.bind {
            overrides = overrides.with_bind_address(bind.clone());
        }
        if let Some(kind) = self.producer {
            overrides = overrides.with_producer_kind(kind);
        }
        if let Some(ref model) = self.model {
            overrides = overrides.with_model(model.clone());
        }
        if let Some(ref contract) = self.contract {
            overrides = overrides.with_contract_path(contract.clone());
        }
        overrides
    }
}

/// Load the file and environment layers, then apply the command line
fn build_config(args: &Args) -> anyhow::Result<BrainConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("brain_daemon={level}").parse()?)
                .add_directive(format!("brain_core={level}").parse()?),
        )
        .with_target(true)
        .init();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Starting Brain Daemon");

    let config = build_config(&args)?;
    info!(
        source = %config.source(),
        bind = %config.server.bind_address,
        producer = %config.producer.kind,
        model = %config.producer.effective_model(),
        "Configuration loaded"
    );

    let mut brain = Brain::from_config(&config)?;
    if brain.check_producer().await == Some(false) {
        warn!(
            producer = %config.producer.kind,
            "Text producer not available - first reply may be slow"
        );
    }
    let worker = brain.spawn_worker();
    let brain = Arc::new(brain);
    info!(contract = %brain.contract_version(), "Brain ready");

    let server = WsServer::bind(&config.server, Arc::clone(&brain)).await?;
    server.run(shutdown_signal()).await?;

    // Dropping the last brain handle closes the turn queue
    drop(brain);
    if let Some(worker) = worker {
        match tokio::time::timeout(WORKER_GRACE, worker).await {
            Ok(Ok(turns)) => info!(turns, "Turn worker finished"),
            Ok(Err(e)) => warn!(error = %e, "Turn worker panicked"),
            Err(_) => warn!("Turn worker did not finish in time"),
        }
    }

    info!("Brain daemon stopped cleanly");
    Ok(())
}
