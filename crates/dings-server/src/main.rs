//! `dings` entry point

use anyhow::Context;
use clap::Parser;
use dings_auth::Config;
use dings_server::{AppState, logging, router};
use std::path::PathBuf;
use tracing::info;

/// Relying-party demo: log in, exchange tokens, call downstream APIs
#[derive(Debug, Parser)]
#[command(name = "dings", version, about)]
struct Cli {
    /// Configuration file (.toml, .yaml, .yml or .json)
    #[arg(short, long, env = "DINGS_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Override the configured port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = cli.port {
        config.application.port = port;
    }

    logging::init(&config.logging).context("Failed to initialize logging")?;

    let addr = format!(
        "{}:{}",
        config.application.bind_address, config.application.port
    );
    info!(
        profile = ?config.application.profile,
        addr = %addr,
        "Starting dings"
    );

    let state = AppState::bootstrap(config)
        .await
        .context("Startup failed")?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    state.mark_ready();
    info!(addr = %addr, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
