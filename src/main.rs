//! Proxy daemon
//!
//! Loads the configuration file, starts the proxy, and runs until a
//! SIGINT or SIGTERM requests a graceful shutdown. Fatal initialization
//! errors (bad configuration, listener bind failure) exit non-zero.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use packet_proxy::{Config, Proxy, ProxyMetrics};

/// High-speed fixed endpoint to which publishers send acquired data
/// packets. Broadcast services subscribe to the backend and forward
/// packets onward in a way that better enables downstream applications.
#[derive(Parser, Debug)]
#[command(name = "packet-proxy", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    init_logging(config.general.verbosity);
    tracing::info!(
        application = %config.general.application_name,
        config = %cli.config.display(),
        "Starting"
    );

    let metrics = Arc::new(ProxyMetrics::new());
    let mut proxy = match Proxy::new(config, Arc::clone(&metrics)) {
        Ok(proxy) => proxy,
        Err(e) => {
            tracing::error!(error = %e, "Failed to construct proxy");
            std::process::exit(1);
        }
    };

    if let Err(e) = proxy.start().await {
        tracing::error!(error = %e, "Proxy failed to start");
        std::process::exit(1);
    }

    wait_for_shutdown_signal().await;
    proxy.stop().await;

    let snapshot = metrics.snapshot();
    tracing::info!(
        packets_received = snapshot.packets_received,
        packets_rejected = snapshot.packets_rejected,
        packets_sent = snapshot.packets_sent,
        "Exiting"
    );
}

/// Map the configured verbosity onto a tracing filter
///
/// `RUST_LOG` wins when set, so operators can raise verbosity for one
/// module without touching the configuration file.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 | 1 => "error",
        2 => "warn",
        3 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("packet_proxy={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("SIGINT received"),
            _ = sigterm.recv() => tracing::info!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
    }
}
