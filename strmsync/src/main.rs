//! strmsync daemon
//!
//! Mirrors remote cloud-drive trees into a local STRM media library on a
//! task schedule.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use strmsync_core::bootstrap::{init_database, init_services, shutdown_services};
use strmsync_core::logging::init_logging;
use strmsync_core::Config;

#[derive(Debug, Parser)]
#[command(name = "strmsync", about = "Cloud-drive to STRM library mirror")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "STRMSYNC_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    // Held until exit so the non-blocking writer flushes on shutdown.
    let _log_guard = init_logging(&config.logging)?;
    info!("strmsync starting");

    let pool = init_database(&config).await?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let services = init_services(pool, &config).await?;
    info!("strmsync ready");

    wait_for_shutdown().await;
    info!("shutdown signal received");
    shutdown_services(&services).await;
    info!("strmsync stopped");
    Ok(())
}

/// Block until SIGINT or SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
