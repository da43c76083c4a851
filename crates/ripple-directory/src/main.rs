// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ripple Directory Server
//!
//! # Usage
//!
//! ```bash
//! # Default ports (commands 5555, snapshots 5556)
//! ripple-directory-server
//!
//! # Loopback only, custom ports
//! ripple-directory-server --bind 127.0.0.1 --command-port 6555 --broadcast-port 6556
//!
//! # From a config file
//! ripple-directory-server --config directory.json
//! ```

use clap::Parser;
use ripple_directory::{DirectoryServer, ServerConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Ripple Directory Server - registry of publishers and their topics
#[derive(Parser, Debug)]
#[command(name = "ripple-directory-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Command (request/reply) port
    #[arg(short = 'p', long, default_value = "5555")]
    command_port: u16,

    /// Snapshot broadcast port
    #[arg(long, default_value = "5556")]
    broadcast_port: u16,

    /// Bind host (* for all interfaces)
    #[arg(short, long, default_value = "*")]
    bind: String,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter directives (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging (RUST_LOG takes precedence over --log-level)
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = if let Some(config_path) = args.config {
        info!("Loading config from {:?}", config_path);
        ServerConfig::from_file(&config_path)?
    } else {
        ServerConfig {
            bind_host: args.bind,
            command_port: args.command_port,
            broadcast_port: args.broadcast_port,
            ..Default::default()
        }
    };

    let mut server = DirectoryServer::start(config).await?;

    info!("+----------------------------------------------------+");
    info!(
        "|       Ripple Directory Server v{}               |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Commands:  {:38} |", server.command_addr());
    info!("|  Snapshots: {:38} |", server.broadcast_addr());
    info!("+----------------------------------------------------+");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping server...");
    server.stop().await;

    let stats = server.broadcast_stats();
    info!(
        "Directory server stopped ({} snapshots, {} bytes broadcast)",
        stats.snapshots_sent, stats.bytes_sent
    );
    Ok(())
}
