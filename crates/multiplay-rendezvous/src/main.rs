//! MultiPlay rendezvous server entry point.
//!
//! Pairs a hosting device and a joining device into a room and relays their
//! session-establishment messages until they have a direct peer connection.
//!
//! # Usage
//!
//! ```text
//! multiplay-rendezvous [OPTIONS]
//!
//! Options:
//!   --bind       <ADDR>  Listener IP address [default: 0.0.0.0]
//!   --port       <PORT>  Listener port [default: 9500]
//!   --max-rooms  <N>     Open-room cap [default: 10000]
//!   --log-level  <LVL>   Log filter when RUST_LOG is unset [default: info]
//!   --config     <FILE>  TOML file; its values replace the address options
//! ```
//!
//! | Variable         | Default   | Description          |
//! |------------------|-----------|----------------------|
//! | `MULTIPLAY_BIND` | `0.0.0.0` | Listener IP address  |
//! | `MULTIPLAY_PORT` | `9500`    | Listener port        |
//! | `MULTIPLAY_LOG`  | `info`    | Fallback log filter  |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use multiplay_rendezvous::domain::config::{DEFAULT_MAX_ROOMS, DEFAULT_PORT};
use multiplay_rendezvous::domain::RendezvousConfig;
use multiplay_rendezvous::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// MultiPlay rendezvous server.
#[derive(Debug, Parser)]
#[command(
    name = "multiplay-rendezvous",
    about = "Room pairing and signaling relay for MultiPlay sessions",
    version
)]
struct Cli {
    /// IP address to bind the WebSocket listener to.
    #[arg(long, default_value = "0.0.0.0", env = "MULTIPLAY_BIND")]
    bind: IpAddr,

    /// TCP port for the WebSocket listener.
    #[arg(long, default_value_t = DEFAULT_PORT, env = "MULTIPLAY_PORT")]
    port: u16,

    /// Maximum number of simultaneously open rooms.
    #[arg(long, default_value_t = DEFAULT_MAX_ROOMS)]
    max_rooms: usize,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info", env = "MULTIPLAY_LOG")]
    log_level: String,

    /// Optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Builds the server configuration from the file (if any) or the flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed.
    fn into_config(self) -> anyhow::Result<RendezvousConfig> {
        if let Some(path) = &self.config {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            return RendezvousConfig::from_toml_str(&text)
                .with_context(|| format!("invalid configuration in {}", path.display()));
        }
        Ok(RendezvousConfig {
            bind_addr: SocketAddr::new(self.bind, self.port),
            max_rooms: self.max_rooms,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str())),
        )
        .init();

    let config = cli.into_config()?;
    info!(addr = %config.bind_addr, "MultiPlay rendezvous server starting");

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    run_server(config, running).await?;

    info!("MultiPlay rendezvous server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
