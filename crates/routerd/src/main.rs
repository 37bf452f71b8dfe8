//! parchmentd - The parchment log router daemon
//!
//! # Usage
//!
//! ```bash
//! parchmentd /etc/parchment/config.toml
//! parchmentd --log-level debug /etc/parchment/config.toml
//! ```
//!
//! Signals: SIGHUP reloads the configuration (a bad file logs an error
//! and keeps the running configuration); SIGINT/SIGTERM shut down
//! gracefully, draining in-flight chains and flushing every output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parchment_config::Config;
use parchment_router::{InputManager, OutputChain};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// The parchment log router
#[derive(Parser, Debug)]
#[command(name = "parchmentd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading '{}'", cli.config.display()))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        inputs = config.inputs.len(),
        outputs = config.outputs.len(),
        "parchmentd starting"
    );

    let manager = Arc::new(InputManager::new());
    apply_config(&manager, &config).await?;

    spawn_reload_handler(Arc::clone(&manager), cli.config.clone())?;

    shutdown_signal().await?;
    info!("termination signal received, shutting down");
    manager.shutdown().await;
    info!("all outputs flushed");
    Ok(())
}

/// Compile the outputs and hand the configuration to the input manager
async fn apply_config(manager: &Arc<InputManager>, config: &Config) -> Result<()> {
    let chain = OutputChain::compile(&config.outputs).context("compiling outputs")?;
    manager.reconfigure(&config.inputs, chain).await;
    Ok(())
}

/// Reload the configuration on SIGHUP, keeping the old one on failure
fn spawn_reload_handler(manager: Arc<InputManager>, path: PathBuf) -> Result<()> {
    let mut hangup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match reload(&manager, &path).await {
                Ok(()) => info!(config = %path.display(), "configuration reloaded"),
                Err(e) => {
                    error!(
                        config = %path.display(),
                        error = %e,
                        "reload failed, keeping previous configuration"
                    );
                }
            }
        }
    });
    Ok(())
}

async fn reload(manager: &Arc<InputManager>, path: &Path) -> Result<()> {
    let config = Config::load(path)?;
    apply_config(manager, &config).await
}

/// Resolve on SIGINT or SIGTERM, whichever lands first
async fn shutdown_signal() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("waiting for ctrl-c")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    Ok(())
}
