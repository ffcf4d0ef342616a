// src/core/state.rs

//! The shared server state handed to transports and background tasks.

use crate::config::Config;
use crate::core::dispatch::{MessageValidator, RequestDispatcher};
use crate::core::engine::{Counters, Engine};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything a request handler needs: the configuration, the protocol
/// engine, and the dispatcher in front of it.
pub struct ServerState {
    pub config: Config,
    pub engine: Arc<Engine>,
    pub dispatcher: RequestDispatcher,
}

impl ServerState {
    pub fn new(
        config: Config,
        statistics: mpsc::Sender<Counters>,
        validator: Arc<dyn MessageValidator>,
    ) -> Arc<Self> {
        let timeout_ms = config.connect_timeout.as_millis() as u64;
        let engine = Arc::new(Engine::new(timeout_ms, statistics));
        let dispatcher = RequestDispatcher::new(Arc::clone(&engine), validator);
        Arc::new(Self {
            config,
            engine,
            dispatcher,
        })
    }
}
