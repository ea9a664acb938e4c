//! Rescheduler entry point.
//!
//! Bootstraps logging, the metrics endpoint, and the cluster client, waits
//! out the initial delay so existing critical workloads can start on their
//! own, then hands control to the reconciliation loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rescheduler::metrics::{self, Metrics};
use rescheduler::oracle::ResourceOracle;
use rescheduler::{Config, HttpClusterClient, Rescheduler};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::parse();
    info!(
        listen_address = %config.listen_address,
        system_namespace = %config.system_namespace,
        "Running rescheduler"
    );

    let shared_metrics = Arc::new(Metrics::new());
    let metrics_handle = Arc::clone(&shared_metrics);
    let listen_address = config.listen_address;
    tokio::spawn(async move {
        if let Err(e) = metrics::serve(listen_address, metrics_handle).await {
            error!(error = %e, "Failed to serve metrics");
            std::process::exit(1);
        }
    });

    tokio::time::sleep(config.initial_delay()).await;

    let client =
        HttpClusterClient::from_config(&config).context("failed to create cluster client")?;
    let oracle = ResourceOracle::new();

    let rescheduler = Rescheduler::new(
        Arc::new(client),
        Arc::new(oracle),
        shared_metrics,
        &config,
    );
    rescheduler.run().await;

    Ok(())
}
