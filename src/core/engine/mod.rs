// src/core/engine/mod.rs

//! The protocol engine: one handler per Bayeux meta verb, client id
//! allocation, and the counter aggregation consumed by the reaper.

use crate::core::metrics;
use crate::core::protocol::{
    Advice, BAYEUX_VERSION, Channel, Client, ClientId, Connection, META_PREFIX, Message, MetaType,
};
use crate::core::registry::ClientRegister;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// The aggregated counter record pushed onto the statistics outlet once per
/// reap tick. All values except `clients` and `subscriber_by_pattern` are
/// deltas since the previous tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub published: u64,
    pub sent: u64,
    pub failed: u64,
    pub clients: u64,
    pub subscriber_by_pattern: u64,
}

/// Handles the six protocol verbs and owns the client register.
pub struct Engine {
    clients: Arc<ClientRegister>,
    next_client_id: AtomicU32,
    published: AtomicU64,
    statistics: mpsc::Sender<Counters>,
    /// Advice timeout, and the hold time for parked polls, in milliseconds.
    timeout_ms: u64,
}

impl Engine {
    pub fn new(timeout_ms: u64, statistics: mpsc::Sender<Counters>) -> Self {
        Self {
            clients: Arc::new(ClientRegister::new()),
            next_client_id: AtomicU32::new(1),
            published: AtomicU64::new(0),
            statistics,
            timeout_ms,
        }
    }

    pub fn get_client(&self, client_id: ClientId) -> Option<Arc<Client>> {
        self.clients.get_client(client_id)
    }

    pub fn client_register(&self) -> &ClientRegister {
        &self.clients
    }

    /// Allocates the next client id and installs a fresh client under it.
    /// The 32-bit counter wraps at overflow; the register's identity
    /// takeover handles the (astronomically rare) collision.
    pub fn new_client(&self) -> Arc<Client> {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let client = Arc::new(Client::new(id));
        self.clients.add_client(Arc::clone(&client));
        client
    }

    /// Handles `/meta/handshake`. On a version match a new client is
    /// allocated and announced; otherwise the reply carries an error and no
    /// client is created. Returns the allocated id, if any.
    pub fn handshake(
        &self,
        request: &Message,
        conn: &Arc<dyn Connection>,
    ) -> Option<ClientId> {
        let version = request
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let mut response = response_from_request(request);
        response.set_successful(false);

        let new_client_id = if version == BAYEUX_VERSION {
            let client = self.new_client();
            metrics::HANDSHAKES_TOTAL.inc();

            let mut granted = Message::new();
            granted.set_client_id(client.id());
            granted.insert(
                "channel",
                Value::String(format!("{META_PREFIX}{}", MetaType::Handshake)),
            );
            granted.insert("version", Value::String(BAYEUX_VERSION.to_string()));
            granted.set_advice(&Advice::retry(self.timeout_ms));
            granted.insert("supportedConnectionTypes", json!(["websocket"]));
            granted.set_successful(true);
            response.update(granted);

            Some(client.id())
        } else {
            response.insert(
                "error",
                Value::String(format!("Only supported version is '{BAYEUX_VERSION}'")),
            );
            None
        };

        deliver(conn, response, request.jsonp());
        new_client_id
    }

    /// Handles `/meta/connect`: builds the poll reply and hands it to the
    /// client, which parks it (single-shot) or answers immediately
    /// (streaming).
    pub fn connect(&self, request: &Message, client: &Arc<Client>, conn: &Arc<dyn Connection>) {
        let mut response = response_from_request(request);
        response.set_client_id(client.id());
        response.set_successful(true);
        response.set_advice(&Advice::retry(self.timeout_ms));

        client.connect(self.timeout_ms, 0, response, Arc::clone(conn));
    }

    /// Handles `/meta/subscribe`. Service-channel patterns are answered but
    /// never registered; they are served directly by application code.
    pub fn subscribe(&self, request: &Message, client: &Arc<Client>) {
        let subscription = request.get("subscription").cloned().unwrap_or(Value::Null);

        let mut response = response_from_request(request);
        response.set_client_id(client.id());
        response.set_successful(true);
        response.insert("subscription", subscription.clone());

        let patterns: Vec<String> = normalize_subscription(&subscription)
            .into_iter()
            .filter(|pattern| !Channel::new(pattern.as_str()).is_service())
            .collect();
        if !patterns.is_empty() {
            info!("SUBSCRIBE client-{} subscription: {:?}", client.id(), patterns);
            self.clients.add_subscription(client, &patterns);
        }

        client.send(response, request.jsonp());
    }

    /// Handles `/meta/unsubscribe`, the mirror of `subscribe`.
    pub fn unsubscribe(&self, request: &Message, client: &Arc<Client>) {
        let subscription = request.get("subscription").cloned().unwrap_or(Value::Null);

        let mut response = response_from_request(request);
        response.set_client_id(client.id());
        response.set_successful(true);
        response.insert("subscription", subscription.clone());

        let patterns: Vec<String> = normalize_subscription(&subscription)
            .into_iter()
            .filter(|pattern| !Channel::new(pattern.as_str()).is_service())
            .collect();
        if !patterns.is_empty() {
            info!(
                "UNSUBSCRIBE client-{} subscription: {:?}",
                client.id(),
                patterns
            );
            self.clients.remove_subscription(client, &patterns);
        }

        client.send(response, request.jsonp());
    }

    /// Handles `/meta/disconnect`. The client is not torn down here; the
    /// reaper collects it once its connection goes quiet.
    pub fn disconnect(&self, request: &Message, client: &Arc<Client>) {
        let mut response = response_from_request(request);
        response.set_successful(true);

        debug!("Client client-{} disconnected", client.id());
        client.send(response, request.jsonp());
    }

    /// Handles a publish: acknowledges the publisher on its own connection,
    /// then fans the payload out to matching subscribers on a background
    /// task so a slow subscriber never stalls the publisher.
    pub fn publish(&self, request: &Message, conn: &Arc<dyn Connection>) {
        let mut response = response_from_request(request);
        response.set_successful(true);

        let publisher_id = request.client_id();
        let channel = request.channel();

        match self.clients.get_client(publisher_id) {
            Some(publisher) => {
                publisher.send(response, request.jsonp());
            }
            None => {
                // The publisher is unknown, but the payload is still fanned
                // out. The acknowledgement goes back on the originating
                // connection, which stays open.
                deliver(conn, response, request.jsonp());
            }
        }

        let mut message = Message::new();
        message.insert("channel", Value::String(channel.name().to_string()));
        message.insert("data", request.get("data").cloned().unwrap_or(Value::Null));
        message.set_client_id(publisher_id);

        self.published.fetch_add(1, Ordering::Relaxed);
        debug!("PUBLISH from client-{publisher_id} on {channel}");

        let register = Arc::clone(&self.clients);
        tokio::spawn(async move {
            register.publish(&message);
        });
    }

    /// Runs one reap sweep and pushes the aggregated counters onto the
    /// statistics outlet. A full outlet drops the sample; the data plane is
    /// never back-pressured by statistics.
    pub fn reap_once(&self) {
        let totals = self.clients.reap();
        let counters = Counters {
            published: self.published.swap(0, Ordering::Relaxed),
            sent: totals.sent,
            failed: totals.failed,
            clients: totals.clients,
            subscriber_by_pattern: totals.subscriber_by_pattern,
        };

        match self.statistics.try_send(counters) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                error!("Statistics outlet is full; dropping counter sample");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Statistics outlet is closed; dropping counter sample");
            }
        }
    }
}

/// Starts a reply from a request: the channel is echoed, and the message id
/// when the client supplied one.
fn response_from_request(request: &Message) -> Message {
    let mut response = Message::new();
    response.insert(
        "channel",
        Value::String(request.channel().name().to_string()),
    );
    if let Some(request_id) = request.get("id") {
        response.insert("id", request_id.clone());
    }
    response
}

/// Sends a reply directly on a connection, respecting the request's jsonp
/// key. Used where no client exists to route through.
fn deliver(conn: &Arc<dyn Connection>, response: Message, jsonp: Option<&str>) {
    let result = match jsonp {
        Some(callback) if !callback.is_empty() => conn.send_jsonp(vec![response], callback),
        _ => conn.send(vec![response]),
    };
    if let Err(e) = result {
        debug!("While replying on connection: {e}");
    }
}

/// Normalises the heterogeneous `subscription` field to a list of pattern
/// strings. Non-string list elements are filtered silently.
fn normalize_subscription(subscription: &Value) -> Vec<String> {
    match subscription {
        Value::String(pattern) => vec![pattern.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
