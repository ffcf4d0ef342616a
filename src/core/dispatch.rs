// src/core/dispatch.rs

//! Normalises decoded requests into individual protocol messages and routes
//! them: meta channels to the engine's verb handlers, everything else to
//! publish.

use crate::core::engine::Engine;
use crate::core::protocol::{Advice, Client, Connection, Message, MetaType};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// The interval, in milliseconds, suggested to unknown clients before they
/// re-handshake.
const REHANDSHAKE_INTERVAL_MS: u64 = 1000;

/// The hook consulted before a publish or subscribe is accepted.
/// Authentication and authorisation live behind this seam; the server
/// itself imposes no policy.
pub trait MessageValidator: Send + Sync {
    fn allow_publish(&self, _message: &Message) -> bool {
        true
    }

    fn allow_subscribe(&self, _message: &Message) -> bool {
        true
    }
}

/// The default validator: everything is allowed.
pub struct AllowAll;

impl MessageValidator for AllowAll {}

/// The shapes a decoded request can arrive in. Transports produce one of
/// these; the dispatcher flattens them into individual messages.
#[derive(Debug)]
pub enum RequestPayload {
    /// A single JSON value, usually an object carrying one message.
    Single(Value),
    /// A JSON list whose elements are individual messages.
    Batch(Vec<Value>),
    /// Form values: a JSON-encoded `message` field plus the form's jsonp
    /// callback, which is stamped onto every decoded message.
    Form {
        message: String,
        jsonp: Option<String>,
    },
}

/// Routes normalised messages into the engine.
pub struct RequestDispatcher {
    engine: Arc<Engine>,
    validator: Arc<dyn MessageValidator>,
}

impl RequestDispatcher {
    pub fn new(engine: Arc<Engine>, validator: Arc<dyn MessageValidator>) -> Self {
        Self { engine, validator }
    }

    /// Entry point for every decoded request.
    pub fn dispatch(&self, payload: RequestPayload, conn: &Arc<dyn Connection>) {
        match payload {
            RequestPayload::Batch(items) => {
                for item in items {
                    if let Some(message) = Message::from_value(item) {
                        self.handle_message(message, conn);
                    }
                }
            }
            RequestPayload::Single(value) => {
                if let Some(message) = Message::from_value(value) {
                    self.handle_single(message, conn);
                }
            }
            RequestPayload::Form { message, jsonp } => match serde_json::from_str(&message) {
                Ok(Value::Array(items)) => {
                    for item in items {
                        self.handle_form_message(item, jsonp.as_deref(), conn);
                    }
                }
                Ok(item) => self.handle_form_message(item, jsonp.as_deref(), conn),
                Err(e) => debug!("Couldn't decode form message field: {e}"),
            },
        }
    }

    /// A single object may be a message, or a wrapper whose `message` field
    /// holds the real payload (form-encoded or nested).
    fn handle_single(&self, message: Message, conn: &Arc<dyn Connection>) {
        match message.get("message") {
            Some(Value::String(encoded)) => {
                let payload = RequestPayload::Form {
                    message: encoded.clone(),
                    jsonp: message.jsonp().map(str::to_string),
                };
                self.dispatch(payload, conn);
            }
            Some(Value::Object(nested)) => {
                let nested = Message::from_value(Value::Object(nested.clone()));
                if let Some(nested) = nested {
                    self.handle_message(nested, conn);
                }
            }
            _ => self.handle_message(message, conn),
        }
    }

    fn handle_form_message(&self, item: Value, jsonp: Option<&str>, conn: &Arc<dyn Connection>) {
        if let Some(mut message) = Message::from_value(item) {
            if let Some(callback) = jsonp {
                message.insert("jsonp", Value::String(callback.to_string()));
            }
            self.handle_message(message, conn);
        }
    }

    /// Classifies one message by channel and routes it.
    fn handle_message(&self, message: Message, conn: &Arc<dyn Connection>) {
        let channel = message.channel();
        if channel.name().is_empty() {
            warn!("Message without a channel");
            self.respond_error(&message, "channel is missing", conn);
            return;
        }

        if channel.is_meta() {
            self.handle_meta(message, conn);
        } else {
            self.handle_publish(message, conn);
        }
    }

    fn handle_meta(&self, message: Message, conn: &Arc<dyn Connection>) {
        let meta_type = message.channel().meta_type().unwrap_or(MetaType::Unknown);

        if meta_type == MetaType::Handshake {
            self.engine.handshake(&message, conn);
            return;
        }

        let Some(client) = self.resolve_client(&message, conn) else {
            return;
        };
        client.set_connection(Arc::clone(conn));

        match meta_type {
            MetaType::Connect => self.engine.connect(&message, &client, conn),
            MetaType::Subscribe => {
                if self.validator.allow_subscribe(&message) {
                    self.engine.subscribe(&message, &client);
                } else {
                    warn!(
                        "Subscribe from client-{} rejected by validator",
                        client.id()
                    );
                    self.respond_error(&message, "subscription denied", conn);
                }
            }
            MetaType::Unsubscribe => self.engine.unsubscribe(&message, &client),
            MetaType::Disconnect => self.engine.disconnect(&message, &client),
            MetaType::Unknown => {
                warn!("Message with unknown meta channel {}", message.channel());
                self.respond_error(&message, "unknown meta channel", conn);
            }
            MetaType::Handshake => {}
        }
    }

    /// Resolves the message's client id. An unknown id is answered with
    /// re-handshake advice on the originating connection, which stays open.
    fn resolve_client(
        &self,
        message: &Message,
        conn: &Arc<dyn Connection>,
    ) -> Option<Arc<Client>> {
        let client_id = message.client_id();
        if let Some(client) = self.engine.get_client(client_id) {
            return Some(client);
        }

        warn!(
            "Message on {} from unknown client-{client_id}",
            message.channel()
        );
        let mut response = response_base(message);
        response.set_successful(false);
        response.set_advice(&Advice::rehandshake(REHANDSHAKE_INTERVAL_MS));
        respond(conn, response, message.jsonp());
        None
    }

    fn handle_publish(&self, message: Message, conn: &Arc<dyn Connection>) {
        if !self.validator.allow_publish(&message) {
            warn!("Publish on {} rejected by validator", message.channel());
            self.respond_error(&message, "publish denied", conn);
            return;
        }
        self.engine.publish(&message, conn);
    }

    fn respond_error(&self, request: &Message, error: &str, conn: &Arc<dyn Connection>) {
        let mut response = response_base(request);
        response.set_successful(false);
        response.insert("error", Value::String(error.to_string()));
        respond(conn, response, request.jsonp());
    }
}

/// A minimal reply skeleton echoing the request's channel and id.
fn response_base(request: &Message) -> Message {
    let mut response = Message::new();
    let channel = request.channel();
    if !channel.name().is_empty() {
        response.insert("channel", Value::String(channel.name().to_string()));
    }
    if let Some(request_id) = request.get("id") {
        response.insert("id", request_id.clone());
    }
    response
}

fn respond(conn: &Arc<dyn Connection>, response: Message, jsonp: Option<&str>) {
    let result = match jsonp {
        Some(callback) if !callback.is_empty() => conn.send_jsonp(vec![response], callback),
        _ => conn.send(vec![response]),
    };
    if let Err(e) = result {
        debug!("While replying on connection: {e}");
    }
}
