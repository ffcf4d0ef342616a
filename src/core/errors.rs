// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the server.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum BayeuxError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("JSON encoding error: {0}")]
    Json(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("A response has already been written to this connection")]
    ResponseAlreadyCompleted,

    #[error("Jsonp is not supported over streaming connections")]
    JsonpUnsupported,

    #[error("Invalid jsonp callback '{0}'")]
    InvalidCallback(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for BayeuxError {
    fn from(e: std::io::Error) -> Self {
        BayeuxError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for BayeuxError {
    fn from(e: serde_json::Error) -> Self {
        BayeuxError::Json(e.to_string())
    }
}
