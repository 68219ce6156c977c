//! SQL gateway - main entry point.
//!
//! Serves the gateway's `query`, `describe_schema` and `list_backends` tools
//! over MCP stdio.

use clap::Parser;
use sql_gateway::config::Config;
use sql_gateway::db::SqlitePoolManager;
use sql_gateway::mcp::GatewayService;
use sql_gateway::models::{ConnectionDescriptor, DatabaseType};
use sql_gateway::transport::{StdioTransport, Transport};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber; logs go to stderr since stdout carries the protocol.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    let pool_config = config.pool_config()?;

    let backends: Vec<String> = DatabaseType::available_backends()
        .iter()
        .map(ToString::to_string)
        .collect();
    info!(
        backends = %backends.join(", "),
        "Starting SQL gateway v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Fail fast on a malformed default target
    if let Some(target) = config.database_url.as_deref() {
        let descriptor = ConnectionDescriptor::parse(target, true)?;
        if !descriptor.db_type.is_available() {
            warn!(db_type = %descriptor.db_type, "Default target uses a backend missing from this build");
        }
        info!(db_type = %descriptor.db_type, location = %descriptor.location, "Default target");
    }

    let pool = SqlitePoolManager::new(pool_config);
    let service = GatewayService::new(pool.clone(), &config);
    let transport = StdioTransport::new(service);

    let result = transport.run().await;
    pool.shutdown().await;

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
