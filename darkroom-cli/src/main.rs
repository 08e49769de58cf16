//! Darkroom CLI
//!
//! Command-line interface for the Darkroom server.

mod commands;
mod config;
mod id_resolver;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "darkroom")]
#[command(about = "Darkroom image editing CLI", long_about = None)]
struct Cli {
    /// Server URL
    #[arg(
        long,
        env = "DARKROOM_SERVER_URL",
        default_value = "http://localhost:8080"
    )]
    server_url: String,

    /// Request timeout in seconds; pipelines can take minutes
    #[arg(long, env = "DARKROOM_TIMEOUT", default_value = "600")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        server_url: cli.server_url,
        timeout_seconds: cli.timeout,
    };

    handle_command(cli.command, &config).await
}
