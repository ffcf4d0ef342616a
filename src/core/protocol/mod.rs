// src/core/protocol/mod.rs

//! The Bayeux protocol vocabulary: channels, messages, advice, the
//! transport-facing connection contract, and the per-client state machine.

// Declare the private sub-modules of the `protocol` module.
mod channel;
mod client;
mod connection;
mod message;

// Publicly re-export the primary types from the sub-modules.
pub use channel::{Channel, META_PREFIX, MetaType, SERVICE_PREFIX};
pub use client::{Client, ClientCounters};
pub use connection::{Connection, SINGLE_SHOT_PRIORITY, STREAMING_PRIORITY};
pub use message::{Advice, BAYEUX_VERSION, ClientId, Message, Reconnect};
