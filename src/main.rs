//! edge-reactor: a single-threaded edge-triggered TCP server
//!
//! One reactor thread serves a single protocol per listener:
//! - echo: raw byte echo
//! - prime: newline-delimited JSON primality queries
//! - means: binary price insert and mean queries
//! - chat: broadcast chat room
//!
//! Configuration via CLI arguments or TOML file.

mod config;
mod protocols;
mod runtime;

use config::Config;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        backlog = config.backlog,
        protocol = ?config.protocol,
        max_connections = config.max_connections,
        "Starting edge-reactor server"
    );

    if let Err(e) = runtime::run(config) {
        error!("Server stopped: {}", e);
        return Err(e.into());
    }
    Ok(())
}
