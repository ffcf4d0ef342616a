// src/core/protocol/message.rs

//! The open message map exchanged on the wire, plus the fixed advice record.

use super::channel::Channel;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The only protocol version this server speaks.
pub const BAYEUX_VERSION: &str = "1.0";

/// The stable client identifier. The wire form is `client-<N>`.
pub type ClientId = u32;

/// The reconnection directive carried in advice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reconnect {
    Retry,
    Handshake,
}

/// The fixed advice record reflected to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advice {
    pub reconnect: Reconnect,
    pub interval: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Advice {
    /// The standing server advice: keep retrying, poll immediately, hold the
    /// poll for `timeout_ms`.
    pub fn retry(timeout_ms: u64) -> Self {
        Self {
            reconnect: Reconnect::Retry,
            interval: 0,
            timeout: Some(timeout_ms),
        }
    }

    /// The advice sent to unknown clients so that they re-handshake.
    pub fn rehandshake(interval_ms: u64) -> Self {
        Self {
            reconnect: Reconnect::Handshake,
            interval: interval_ms,
            timeout: None,
        }
    }
}

/// A single Bayeux message: an open mapping from string keys to dynamically
/// typed values. Accessors tolerate absent or wrongly typed keys and fall
/// back to neutral values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Map<String, Value>);

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interprets a decoded JSON value as a message. Only objects qualify.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    /// The channel this message addresses; empty when absent or not a string.
    pub fn channel(&self) -> Channel {
        match self.0.get("channel").and_then(Value::as_str) {
            Some(name) => Channel::new(name),
            None => Channel::new(""),
        }
    }

    /// Decodes the `clientId` key from its `client-<N>` wire form.
    /// Returns the zero sentinel when absent or unparsable.
    pub fn client_id(&self) -> ClientId {
        self.0
            .get("clientId")
            .and_then(Value::as_str)
            .and_then(|id| id.strip_prefix("client-"))
            .and_then(|digits| digits.parse().ok())
            .unwrap_or(0)
    }

    pub fn set_client_id(&mut self, client_id: ClientId) {
        self.insert("clientId", Value::String(format!("client-{client_id}")));
    }

    /// The jsonp callback name, present only on GET-style polling requests.
    pub fn jsonp(&self) -> Option<&str> {
        self.0.get("jsonp").and_then(Value::as_str)
    }

    pub fn set_successful(&mut self, successful: bool) {
        self.insert("successful", Value::Bool(successful));
    }

    pub fn set_advice(&mut self, advice: &Advice) {
        self.insert(
            "advice",
            serde_json::to_value(advice).unwrap_or(Value::Null),
        );
    }

    /// Merges `update` into this message, overwriting existing keys.
    pub fn update(&mut self, update: Message) {
        for (key, value) in update.0 {
            self.0.insert(key, value);
        }
    }
}
