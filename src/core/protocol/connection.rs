// src/core/protocol/connection.rs

//! The contract every transport-level connection fulfils.

use super::message::Message;
use crate::core::errors::BayeuxError;

/// Priority of a streaming (full-duplex socket) connection.
pub const STREAMING_PRIORITY: u8 = 10;
/// Priority of a single-shot (long-poll) connection.
pub const SINGLE_SHOT_PRIORITY: u8 = 1;

/// A transport-level connection capable of delivering batches of messages
/// to one client.
///
/// Two variants exist: *streaming* connections carry many batches over one
/// socket, while *single-shot* connections park exactly one response batch
/// per HTTP exchange. A client holding a streaming connection must never be
/// downgraded to a single-shot one; `priority` encodes that ordering.
///
/// All methods are non-blocking: implementations hand batches to a writer
/// task or a rendezvous channel rather than performing wire I/O inline.
pub trait Connection: Send + Sync {
    /// Delivers a batch of messages, JSON-encoded.
    fn send(&self, batch: Vec<Message>) -> Result<(), BayeuxError>;

    /// Delivers a batch wrapped in a JavaScript callback invocation.
    /// Streaming transports reject this.
    fn send_jsonp(&self, batch: Vec<Message>, callback: &str) -> Result<(), BayeuxError>;

    /// True while the underlying transport is believed to be live.
    fn is_connected(&self) -> bool;

    /// True for long-poll style connections that can carry one batch only.
    fn is_single_shot(&self) -> bool;

    /// Delivery-path priority; higher wins when a client swaps connections.
    fn priority(&self) -> u8;

    /// Releases the underlying transport. Idempotent.
    fn close(&self);
}
