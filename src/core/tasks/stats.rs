// src/core/tasks/stats.rs

//! A background task that drains the statistics outlet into the metrics
//! registry.

use crate::core::engine::Counters;
use crate::core::metrics;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

/// Consumes the counter samples the reaper produces, one per tick.
pub struct StatsConsumerTask {
    rx: mpsc::Receiver<Counters>,
}

impl StatsConsumerTask {
    pub fn new(rx: mpsc::Receiver<Counters>) -> Self {
        Self { rx }
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Statistics consumer task started.");
        loop {
            tokio::select! {
                maybe_counters = self.rx.recv() => {
                    match maybe_counters {
                        Some(counters) => {
                            metrics::record_counters(&counters);
                            debug!(
                                "Stats: published={} sent={} failed={} clients={} patterns={}",
                                counters.published,
                                counters.sent,
                                counters.failed,
                                counters.clients,
                                counters.subscriber_by_pattern,
                            );
                        }
                        None => {
                            info!("Statistics outlet closed; consumer task stopping.");
                            return;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Statistics consumer task shutting down.");
                    return;
                }
            }
        }
    }
}
