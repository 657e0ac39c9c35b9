//! statecast daemon - UDP to TCP state relay
//!
//! Receives datagrams on a UDP socket, keeps a running sum of every integer
//! payload, and writes one annotated line per datagram to every connected
//! TCP client.
//!
//! # Usage
//!
//! ```bash
//! # Listen on 127.0.0.1:8080 (UDP and TCP)
//! statecastd
//!
//! # Separate addresses and a connection cap
//! statecastd --udp 0.0.0.0:9000 --tcp 0.0.0.0:9001 --max-connections 100
//!
//! # Load settings from a file, override with the environment
//! STATECAST_ADDR=0.0.0.0:7000 statecastd --config /etc/statecast.toml
//!
//! # Enable debug logging
//! RUST_LOG=statecastd=debug statecastd
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown, all clients are disconnected

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use statecastd::config::RelayConfig;
use statecastd::monitor::spawn_monitor_task;
use statecastd::server::RelayServer;

/// statecast daemon - relay UDP datagrams to TCP clients
#[derive(Parser, Debug)]
#[command(name = "statecastd", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address for both the UDP socket and the TCP listener
    #[arg(short, long)]
    addr: Option<SocketAddr>,

    /// UDP listen address (overrides --addr)
    #[arg(long)]
    udp: Option<SocketAddr>,

    /// TCP listen address (overrides --addr)
    #[arg(long)]
    tcp: Option<SocketAddr>,

    /// Maximum concurrent TCP clients (0 = unlimited)
    #[arg(long)]
    max_connections: Option<usize>,

    /// Per-client write timeout in milliseconds
    #[arg(long)]
    write_timeout_ms: Option<u64>,

    /// Seconds between status log lines (0 = disabled)
    #[arg(long)]
    stats_interval_secs: Option<u64>,
}

impl Args {
    /// Layers defaults, config file, environment and flags.
    fn into_config(self) -> Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load(path)?,
            None => RelayConfig::default(),
        };
        config = config.apply_env()?;

        if let Some(addr) = self.addr {
            config = config.bind(addr);
        }
        if let Some(addr) = self.udp {
            config = config.udp_addr(addr);
        }
        if let Some(addr) = self.tcp {
            config = config.tcp_addr(addr);
        }
        if let Some(max) = self.max_connections {
            config = config.max_connections(max);
        }
        if let Some(ms) = self.write_timeout_ms {
            config = config.write_timeout(Duration::from_millis(ms));
        }
        if let Some(secs) = self.stats_interval_secs {
            config = config.stats_interval(Duration::from_secs(secs));
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    let config = Args::parse()
        .into_config()
        .context("Failed to load configuration")?;

    run_daemon(config)
}

#[tokio::main]
async fn run_daemon(config: RelayConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("statecastd=info".parse()?)
                .add_directive("statecast_core=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "statecast daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let stats_interval = config.stats_interval_duration();
    let server = RelayServer::bind(config, cancel_token.clone())
        .await
        .context("Failed to start relay server")?;

    if let Some(period) = stats_interval {
        let _monitor_handle = spawn_monitor_task(
            server.registry(),
            server.stats(),
            period,
            cancel_token.clone(),
        );
        info!("Process monitor started");
    }

    let final_state = server.run().await.map_err(|e| {
        error!(error = %e, "Server error");
        e
    })?;

    info!(final_state, "statecast daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
