#![allow(dead_code)]

use bayeuxd::core::errors::BayeuxError;
use bayeuxd::core::protocol::{
    Connection, Message, SINGLE_SHOT_PRIORITY, STREAMING_PRIORITY,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A transport stand-in that records every batch handed to it.
pub struct MockConnection {
    batches: Mutex<Vec<Vec<Message>>>,
    jsonp_batches: Mutex<Vec<(Vec<Message>, String)>>,
    connected: AtomicBool,
    fail_sends: AtomicBool,
    single_shot: bool,
    priority: u8,
}

impl MockConnection {
    pub fn streaming() -> Arc<Self> {
        Arc::new(Self::new(false, STREAMING_PRIORITY))
    }

    pub fn polling() -> Arc<Self> {
        Arc::new(Self::new(true, SINGLE_SHOT_PRIORITY))
    }

    fn new(single_shot: bool, priority: u8) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            jsonp_batches: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            single_shot,
            priority,
        }
    }

    pub fn batches(&self) -> Vec<Vec<Message>> {
        self.batches.lock().clone()
    }

    pub fn jsonp_batches(&self) -> Vec<(Vec<Message>, String)> {
        self.jsonp_batches.lock().clone()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn last_batch(&self) -> Vec<Message> {
        self.batches.lock().last().cloned().unwrap_or_default()
    }

    /// Simulates the peer going away.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }

    /// Makes every subsequent send report a transport error.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::Relaxed);
    }
}

impl Connection for MockConnection {
    fn send(&self, batch: Vec<Message>) -> Result<(), BayeuxError> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(BayeuxError::ConnectionClosed);
        }
        self.batches.lock().push(batch);
        Ok(())
    }

    fn send_jsonp(&self, batch: Vec<Message>, callback: &str) -> Result<(), BayeuxError> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(BayeuxError::ConnectionClosed);
        }
        self.jsonp_batches.lock().push((batch, callback.to_string()));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn is_single_shot(&self) -> bool {
        self.single_shot
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn close(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }
}

/// Widens a mock to the trait object the core APIs take.
pub fn as_conn(mock: &Arc<MockConnection>) -> Arc<dyn Connection> {
    Arc::clone(mock) as Arc<dyn Connection>
}

/// Builds a message from a JSON literal. Panics on non-objects; tests only
/// pass objects.
pub fn msg(value: Value) -> Message {
    Message::from_value(value).expect("test messages must be JSON objects")
}

/// Reads a string field out of a message.
pub fn str_field<'a>(message: &'a Message, key: &str) -> Option<&'a str> {
    message.get(key).and_then(Value::as_str)
}

/// Reads a bool field out of a message.
pub fn bool_field(message: &Message, key: &str) -> Option<bool> {
    message.get(key).and_then(Value::as_bool)
}
