//! ctlterm session server
//!
//! Accepts connections and runs the demonstration service on each one.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ct_core::config::{self, ServerConfig};
use ct_server::demo::DemoService;
use ct_server::Listener;

#[derive(Parser)]
#[command(name = "ct-server")]
#[command(about = "ctlterm session server")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Base64 public key required to authenticate (overrides config)
    #[arg(long, env = "CTLTERM_AUTHORIZED_KEY")]
    authorized_key: Option<String>,

    /// Seconds to wait for a client reply before giving up (overrides config)
    #[arg(long)]
    reply_timeout: Option<u64>,

    /// Maximum number of concurrent sessions (overrides config)
    #[arg(long)]
    max_connections: Option<usize>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("ctlterm server starting...");

    let mut config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_server_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                ServerConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            ServerConfig::default()
        }
    };

    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(key) = args.authorized_key {
        config.authorized_key = Some(key);
    }
    if let Some(secs) = args.reply_timeout {
        config.reply_timeout = Some(std::time::Duration::from_secs(secs));
    }
    if let Some(max) = args.max_connections {
        config.max_connections = Some(max);
    }

    let service = DemoService::from_config(&config).context("Invalid authorized key")?;
    if config.authorized_key.is_none() {
        tracing::warn!("No authorized key configured - sessions skip authentication");
    }

    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let listener = Listener::bind(config).await?;
    listener.serve(Arc::new(service), cancel).await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}
