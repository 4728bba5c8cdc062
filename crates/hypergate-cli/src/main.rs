//! HyperGate CLI entry point: `clap` derive `Cli`/`Commands`,
//! `tracing-subscriber` init, one subcommand per server transport.

use clap::{Parser, Subcommand};
use colored::*;
use hypergate_core::GatewayConfig;
use hypergate_mcp::{GatewayApp, HyperGateServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "hypergate",
    version,
    author,
    about = "HyperGate - a learning MCP gateway over downstream tools and mined capabilities"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Configuration file path (TOML)")]
    config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "info", help = "Log level filter (error|warn|info|debug|trace)")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start the MCP server")]
    Serve {
        #[command(subcommand)]
        transport: TransportArg,
    },
}

#[derive(Subcommand)]
enum TransportArg {
    #[command(about = "Serve over stdio (the default MCP client transport)")]
    Stdio,
    #[command(about = "Serve over streamable HTTP")]
    Http {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value = "8765")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone()),
        )
        .init();

    let config = GatewayConfig::load(cli.config.as_ref().and_then(|p| p.to_str())).unwrap_or_else(|e| {
        error!("failed to load config, using defaults: {}", e);
        GatewayConfig::default()
    });

    match cli.command {
        Commands::Serve { transport } => {
            info!("{}", "starting HyperGate MCP gateway".green());
            let app = Arc::new(GatewayApp::new(config));
            let server = HyperGateServer::new(app);

            match transport {
                TransportArg::Stdio => hypergate_mcp::serve_stdio(server).await?,
                TransportArg::Http { host, port } => {
                    hypergate_mcp::serve_http(server, &host, port).await?
                }
            }
        }
    }

    Ok(())
}
