use clap::Parser;
use cold_storage_gateway::Store;
use std::{net::SocketAddr, path::PathBuf};
use tracing::{error, info};

// Used by the library only.
use axum as _;
use chrono as _;
use cold_storage_core as _;
use cold_storage_protocol as _;
use rusqlite as _;
use thiserror as _;
use tower_http as _;
#[cfg(test)]
use reqwest as _;
#[cfg(test)]
use serde_json as _;

/// HTTP gateway storing cold-storage sensor readings.
#[derive(Parser)]
#[command(version = git_version::git_version!(fallback = "unknown"))]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:3000")]
    bind: SocketAddr,

    /// SQLite database file, created if missing
    #[arg(long, default_value = "cold-storage.db")]
    database: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let store = match Store::open(&cli.database) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open database {}: {e}", cli.database.display());
            ::std::process::exit(1);
        }
    };
    info!("Using database {}", cli.database.display());

    let listener = match tokio::net::TcpListener::bind(cli.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {e}", cli.bind);
            ::std::process::exit(1);
        }
    };
    info!("Listening on http://{}", cli.bind);

    if let Err(e) = cold_storage_gateway::serve(listener, store).await {
        error!("Server error: {e}");
        ::std::process::exit(1);
    }
}
