// src/core/tasks/reaper.rs

//! A background task that periodically sweeps the client register for dead
//! clients and aggregates counters.

use crate::core::state::ServerState;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// The background task struct for the client reaper.
pub struct ReaperTask {
    state: Arc<ServerState>,
}

impl ReaperTask {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    /// The main run loop for the reaper task.
    /// Each tick removes reapable clients and pushes a counter sample onto
    /// the statistics outlet.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Client reaper task started.");
        let mut interval = tokio::time::interval(self.state.config.reap_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.state.engine.reap_once();
                }
                _ = shutdown_rx.recv() => {
                    info!("Client reaper task shutting down.");
                    return;
                }
            }
        }
    }
}
