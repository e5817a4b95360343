//! LAN presence beacon daemon.
//!
//! Periodically announces a display name and port to the local network via
//! multicast UDP so clients on the same segment can discover the advertised
//! service. Runs until interrupted.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use lanbeacon_broadcast::{resolver, LanBroadcaster, DISCOVERY_TARGET};

use cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing: RUST_LOG wins when set, the CLI flag is the fallback.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level.to_string()));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_beacon(cli))
}

async fn run_beacon(cli: Cli) -> Result<()> {
    let bind = match (cli.address, cli.interface.as_deref()) {
        (Some(addr), _) => Some(addr),
        (None, Some(iface)) => Some(
            resolver::resolve(Some(iface))
                .with_context(|| format!("No usable address on interface {iface}"))?,
        ),
        (None, None) => None,
    };

    let broadcaster = Arc::new(
        LanBroadcaster::new(bind, cli.port, cli.motd)
            .context("Failed to create LAN broadcaster")?,
    );
    broadcaster.set_interval(cli.interval);

    tracing::info!(
        local = %broadcaster.local_addr()?,
        target = %DISCOVERY_TARGET,
        port = cli.port,
        interval_secs = cli.interval,
        "Started broadcasting to LAN"
    );

    let worker = Arc::clone(&broadcaster);
    let loop_task = tokio::spawn(async move { worker.broadcast().await });

    // Block until a shutdown signal arrives.
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }

    broadcaster.close();
    loop_task.await.context("Broadcast loop panicked")?;

    tracing::info!("Shutdown complete");
    Ok(())
}
