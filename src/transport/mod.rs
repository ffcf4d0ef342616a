// src/transport/mod.rs

//! The transport layer: the HTTP front door and the two connection
//! variants behind the `Connection` trait.

pub mod http;
pub mod websocket;

// Publicly re-export the connection types for tests and embedders.
pub use http::{LongPollConnection, PollResponse};
pub use websocket::WebSocketConnection;
