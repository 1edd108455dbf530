//! AgroCert CLI — the main entry point.
//!
//! Commands:
//! - `serve`   — Start the HTTP gateway
//! - `tools`   — List the registered tool definitions
//! - `doctor`  — Check configuration health

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "agrocert",
    about = "AgroCert — AI assistant runtime for agricultural finance certification",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file (default: agrocert.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List the registered tool definitions as JSON
    Tools,

    /// Check configuration health
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = agrocert_config::AppConfig::load(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            agrocert_gateway::start(config)
                .await
                .map_err(|e| anyhow::anyhow!("gateway failed: {e}"))?;
        }

        Commands::Tools => {
            // Definitions only — nothing executes, so an in-memory store
            // is enough to build the registry.
            let store = std::sync::Arc::new(agrocert_store::MemStore::new());
            let registry = agrocert_tools::certification_registry(store)?;
            let definitions = registry.definitions();
            println!("{}", serde_json::to_string_pretty(&definitions)?);
        }

        Commands::Doctor => {
            println!("AgroCert configuration check");
            println!(
                "  model:        {} (max_tokens {})",
                config.model, config.max_tokens
            );
            println!(
                "  api key:      {}",
                if config.has_api_key() {
                    "configured"
                } else {
                    "MISSING — set ANTHROPIC_API_KEY"
                }
            );
            println!(
                "  database:     {}",
                if config.database.url.is_some() {
                    "configured"
                } else {
                    "MISSING — set DATABASE_URL"
                }
            );
            println!(
                "  gateway:      {}:{}",
                config.gateway.host, config.gateway.port
            );
            println!(
                "  agent:        max_iterations {}, history_limit {}",
                config.agent.max_iterations, config.agent.history_limit
            );

            if !config.has_api_key() || config.database.url.is_none() {
                anyhow::bail!("configuration incomplete");
            }
            println!("All checks passed.");
        }
    }

    Ok(())
}
