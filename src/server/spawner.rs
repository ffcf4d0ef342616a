// src/server/spawner.rs

//! Spawns all of the server's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use crate::core::tasks::reaper::ReaperTask;
use crate::core::tasks::stats::StatsConsumerTask;
use anyhow::{Result, anyhow};
use tracing::info;

/// Spawns all critical background tasks into the provided JoinSet.
pub fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let server_state = &ctx.state;
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    // --- Metrics Server ---
    if server_state.config.metrics.enabled {
        let metrics_port = server_state.config.metrics.port;
        let shutdown_rx_metrics = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(metrics_port, shutdown_rx_metrics).await;
            Ok(())
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    // --- Client Reaper ---
    let reaper = ReaperTask::new(server_state.clone());
    let shutdown_rx_reaper = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        reaper.run(shutdown_rx_reaper).await;
        Ok(())
    });

    // --- Statistics Consumer ---
    let statistics_rx = ctx
        .statistics_rx
        .take()
        .ok_or_else(|| anyhow!("Statistics outlet receiver already taken"))?;
    let consumer = StatsConsumerTask::new(statistics_rx);
    let shutdown_rx_stats = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        consumer.run(shutdown_rx_stats).await;
        Ok(())
    });

    info!("All background tasks have been spawned.");
    Ok(())
}
