//! Airtable MCP Server - Entry Point
//!
//! Serves the Streamable HTTP MCP endpoint and its OAuth 2.1 authorization
//! server on one listener.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use airtable_mcp::{
    AirtableClient,
    config::{Config, Environment},
    server::McpServer,
};

#[derive(Parser, Debug)]
#[command(name = "airtable-mcp")]
#[command(about = "Remote MCP server for Airtable with OAuth 2.1")]
#[command(version)]
struct Cli {
    /// Bind address (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// HTTP server port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Public base URL used in metadata and challenges (overrides BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Deployment environment (overrides ENVIRONMENT)
    #[arg(long)]
    environment: Option<Environment>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    let mut config = match cli.environment {
        Some(environment) => Config::from_env_for(environment)?,
        None => Config::from_env()?,
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url.trim_end_matches('/').to_string();
    }
    config.validate()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = config.environment.as_str(),
        airtable_configured = config.has_api_key(),
        "Starting Airtable MCP server"
    );

    let client = AirtableClient::new(&config)?;
    let server = McpServer::new(config, Arc::new(client))?;
    server.run_http().await
}
