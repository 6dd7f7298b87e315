//! ctlterm client
//!
//! Connects to a ctlterm server and acts as a tiny terminal for the session.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ct_client::{connect, Interpreter, TerminalConsole};
use ct_core::auth::SecretKey;
use ct_core::config::{self, ClientConfig};
use ct_core::{ConnectionError, CtError, SessionError};

#[derive(Parser)]
#[command(name = "ct-client")]
#[command(about = "ctlterm client")]
#[command(version)]
struct Cli {
    /// Server to connect to (overrides config)
    address: Option<String>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log every control frame received
    #[arg(short, long)]
    debug: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the public key derived from a passphrase
    Keygen,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.debug && cli.log_level == "warn" {
        "debug".to_string()
    } else {
        cli.log_level.clone()
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or(level),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(Commands::Keygen) = cli.command {
        return keygen();
    }

    let mut config = if let Some(config_path) = &cli.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_client_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                ClientConfig::default()
            })
        } else {
            ClientConfig::default()
        }
    };

    if let Some(address) = cli.address {
        config.server_address = address;
    }
    config.debug |= cli.debug;

    let stream = match connect(&config.server_address, config.connect_timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!("{}", e);
            eprintln!("No connection");
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut interpreter =
        Interpreter::new(stream, TerminalConsole::new()).with_debug(config.debug);

    let result = tokio::select! {
        result = interpreter.run() => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!();
            eprintln!("Abort");
            return Ok(ExitCode::FAILURE);
        }
    };

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!();
            eprintln!("{}", describe(&e));
            tracing::debug!("Session ended with error: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn keygen() -> Result<ExitCode> {
    let passphrase =
        rpassword::prompt_password("Passphrase: ").context("Failed to read passphrase")?;
    if passphrase.is_empty() {
        eprintln!("Passphrase must not be empty");
        return Ok(ExitCode::FAILURE);
    }
    println!("{}", SecretKey::from_passphrase(&passphrase).public_key());
    Ok(ExitCode::SUCCESS)
}

fn describe(error: &CtError) -> String {
    match error {
        CtError::Protocol(e) => format!("Protocol error: {}", e),
        CtError::Connection(ConnectionError::ConnectionLost(_)) => "Lost connection".to_string(),
        CtError::Connection(ConnectionError::Aborted(_)) => "Abort".to_string(),
        CtError::Connection(ConnectionError::Refused(_)) => "No connection".to_string(),
        CtError::Session(SessionError::Cancelled) => "Abort".to_string(),
        e if e.is_disconnect() => "Lost connection".to_string(),
        e => e.to_string(),
    }
}
