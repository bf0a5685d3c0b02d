//! HTTP server for the crop recommendation service.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use server::{CliOverrides, ServiceConfig, app_from_config};

/// Crop recommendation prediction server
#[derive(Parser)]
#[command(name = "crop-server")]
#[command(about = "Serves crop recommendations over HTTP", long_about = None)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Forward request bodies to the predictor without weather enrichment
    #[arg(long)]
    no_enrichment: bool,

    /// Predictor program to run (overrides config)
    #[arg(long)]
    predictor_program: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,server=debug,pipeline=debug")),
        )
        .init();

    let args = Args::parse();
    let overrides = CliOverrides {
        bind: args.bind,
        enrichment_enabled: args.no_enrichment.then_some(false),
        predictor_program: args.predictor_program,
        ..CliOverrides::default()
    };

    let config = ServiceConfig::load(args.config.as_deref(), Some(&overrides))
        .context("Failed to load configuration")?;
    let app = app_from_config(&config)?;

    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
