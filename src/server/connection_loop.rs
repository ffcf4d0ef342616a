// src/server/connection_loop.rs

//! The main serve loop: drives the HTTP endpoint until the process is asked
//! to stop, then winds the background tasks down.

use super::context::ServerContext;
use crate::transport;
use std::future::IntoFuture;
use std::time::Duration;
use tracing::{error, info, warn};

/// How long the shutdown sequence waits for background tasks before giving
/// up on them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Resolves once the process has been told to stop: SIGINT or SIGTERM on
/// Unix, Ctrl+C elsewhere.
#[cfg(unix)]
async fn stop_requested() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Cannot listen for SIGINT: {e}");
            return std::future::pending().await;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Cannot listen for SIGTERM: {e}");
            return std::future::pending().await;
        }
    };

    let which = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    };
    info!("{which} received, stopping.");
}

#[cfg(not(unix))]
async fn stop_requested() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for Ctrl+C: {e}");
        return std::future::pending().await;
    }
    info!("Ctrl+C received, stopping.");
}

/// The main serve loop. Serves the Bayeux endpoint until a stop signal
/// arrives, a background task dies, or the listener itself fails, then runs
/// the shutdown sequence.
pub async fn run(mut ctx: ServerContext) {
    let app = transport::http::router(ctx.state.clone());

    let mut server_shutdown_rx = ctx.shutdown_tx.subscribe();
    let server = axum::serve(ctx.listener, app)
        .with_graceful_shutdown(async move {
            server_shutdown_rx.recv().await.ok();
        })
        .into_future();
    tokio::pin!(server);
    let mut server_finished = false;

    loop {
        tokio::select! {
            biased; // Check for a stop signal before anything else.

            _ = stop_requested() => {
                break;
            },

            // A background task returning is fine; one failing or panicking
            // takes the server down with it.
            Some(finished) = ctx.background_tasks.join_next() => {
                match finished {
                    Ok(Ok(())) => info!("A background task finished (normal for disabled features)."),
                    Ok(Err(e)) => { error!("Background task error, stopping the server: {e}"); break; }
                    Err(e) => { error!("Background task panic, stopping the server: {e:?}"); break; }
                }
            },

            // The HTTP endpoint only returns on listener failure or after a
            // graceful shutdown was requested.
            result = &mut server => {
                server_finished = true;
                match result {
                    Ok(()) => info!("Bayeux endpoint stopped serving."),
                    Err(e) => error!("Bayeux endpoint failed: {e}"),
                }
                break;
            },
        }
    }

    // Tell every task to wind down, let the endpoint drain its connections,
    // then give the rest a bounded window to exit.
    info!("Broadcasting shutdown to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        error!("No task is listening for shutdown; exiting anyway.");
    }

    if !server_finished {
        if let Err(e) = server.await {
            error!("Bayeux endpoint failed while draining: {e}");
        }
    }

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            "Background tasks still running after {:?}; abandoning them.",
            SHUTDOWN_GRACE
        );
    }
    info!("bayeuxd stopped.");
}
