//! Secret manager CLI
//!
//! This is the main entry point for the CLI application.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use secret_manager::{cli, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    telemetry::describe_metrics();

    let cli = cli::Cli::parse();
    cli::execute(cli).await
}
