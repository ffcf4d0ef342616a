// src/server/metrics_server.rs

//! A small HTTP endpoint exposing the Prometheus registry.

use crate::core::metrics::gather_metrics;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Serves `GET /metrics` in the Prometheus text exposition format.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

/// Serves the metrics endpoint on `port` until the shutdown broadcast
/// fires. A bind failure is logged and gives up on metrics rather than
/// taking the data plane down.
pub async fn run_metrics_server(port: u16, mut shutdown_rx: broadcast::Receiver<()>) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Metrics endpoint could not bind {addr}: {e}");
            return;
        }
    };
    info!("Serving Prometheus metrics at {addr}/metrics");

    let routes = Router::new().route("/metrics", get(metrics_handler));
    let stop = async move {
        shutdown_rx.recv().await.ok();
        info!("Metrics endpoint stopping.");
    };

    if let Err(e) = axum::serve(listener, routes)
        .with_graceful_shutdown(stop)
        .await
    {
        error!("Metrics endpoint failed: {e}");
    }
}
