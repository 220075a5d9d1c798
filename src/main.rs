//! TideKV - Key-Value Store with Per-Key Expiration
//!
//! This is the main entry point for the TideKV server.
//! It opens the store registry, re-arms persisted stores and serves HTTP.

use clap::Parser;
use std::sync::Arc;
use tidekv::storage::{RedbDatabase, StorageMode, StoreRegistry, SystemClock};
use tidekv::{AppState, Config};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config) {
    let storage = match &config.db {
        Some(path) => format!("redb ({})", path.display()),
        None => "in-memory".to_string(),
    };

    println!(
        r#"
  _   _     _      _
 | |_(_) __| | ___| | ____   __
 | __| |/ _` |/ _ \ |/ /\ \ / /
 | |_| | (_| |  __/   <  \ V /
  \__|_|\__,_|\___|_|\_\  \_/

TideKV v{} - Key-Value Store with Per-Key Expiration
──────────────────────────────────────────────────────
Listening on http://{}
Storage:     {}

Use Ctrl+C to shutdown gracefully.
"#,
        tidekv::VERSION,
        config.bind_address(),
        storage
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Set up logging; RUST_LOG takes precedence over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    if !config.quiet {
        print_banner(&config);
    }

    let mode = match &config.db {
        Some(path) => {
            let db = RedbDatabase::open(path)?;
            info!(path = %path.display(), "Opened redb database");
            StorageMode::Redb(db)
        }
        None => StorageMode::Memory,
    };

    let registry = Arc::new(
        StoreRegistry::new(mode, Arc::new(SystemClock)).with_max_stores(config.max_stores),
    );
    registry.open_existing().await?;

    let listener = TcpListener::bind(config.bind_address()).await?;

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tidekv::serve(listener, AppState::new(registry), shutdown).await?;

    info!("Server shutdown complete");
    Ok(())
}
