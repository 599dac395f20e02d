#![cfg_attr(not(test), forbid(unsafe_code))]
#![warn(clippy::pedantic)]

//! Entry point for the FarmLink chat server binary.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use server::server::{repair_previews, run};
use shared::config::server::Config;


/// FarmLink chat server
#[derive(Debug, Parser)]
#[command(name = "farmlink-server")]
#[command(about = "Chat backend for the FarmLink marketplace", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind; overrides the configuration file and `FARMLINK_SERVER_PORT`
        #[arg(long, short)]
        port: Option<u16>,

        /// Configuration file (.yaml, .yml or .json)
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Recompute every conversation preview from its newest message
    RepairPreviews {
        /// Configuration file (.yaml, .yml or .json)
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

/// Loads configuration and serves until shutdown.
///
/// # Errors
/// Returns an error if configuration loading or server startup fails.
pub async fn handle_serve_command(port: Option<u16>, config: Option<PathBuf>) -> anyhow::Result<()> {
    let resolved = Config::load_config(config, port).context("loading configuration")?;
    run(resolved).await
}

/// Runs the preview repair once and reports the count.
///
/// # Errors
/// Returns an error if configuration loading or the repair fails.
pub async fn handle_repair_command(config: Option<PathBuf>) -> anyhow::Result<()> {
    let resolved = Config::load_config(config, None).context("loading configuration")?;
    let repaired = repair_previews(resolved).await?;
    println!("repaired {repaired} conversation previews");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    match Cli::parse().command {
        Commands::Serve { port, config } => handle_serve_command(port, config).await,
        Commands::RepairPreviews { config } => handle_repair_command(config).await,
    }
}
