// src/server/initialization.rs

//! Handles server initialization: state setup, the statistics outlet, and
//! the listener socket.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::dispatch::AllowAll;
use crate::core::state::ServerState;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::info;

/// The statistics outlet holds a handful of reap-tick samples. A full
/// outlet drops samples rather than back-pressuring the reaper.
const STATISTICS_OUTLET_CAPACITY: usize = 8;

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);
    let (statistics_tx, statistics_rx) = mpsc::channel(STATISTICS_OUTLET_CAPACITY);

    let addr = format!("{}:{}", config.host, config.port);
    let state = ServerState::new(config, statistics_tx, Arc::new(AllowAll));
    info!("Server state initialized.");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind listener on {addr}"))?;
    info!("Listening for Bayeux connections on {addr}");

    Ok(ServerContext {
        state,
        statistics_rx: Some(statistics_rx),
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

fn log_startup_info(config: &Config) {
    info!(
        "Starting bayeuxd (reap interval {:?}, connect timeout {:?})",
        config.reap_interval, config.connect_timeout
    );
}
