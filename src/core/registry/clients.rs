// src/core/registry/clients.rs

//! The register of connected clients and the publish fan-out path.

use super::subscriptions::SubscriptionRegister;
use crate::core::protocol::{Client, ClientId, Message};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Counter totals accumulated by one reap sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapTotals {
    /// Clients remaining after the sweep.
    pub clients: u64,
    pub sent: u64,
    pub failed: u64,
    /// Patterns with at least one subscriber after the sweep.
    pub subscriber_by_pattern: u64,
}

/// Maps client ids to clients and owns the subscription register, keeping
/// the two in lock-step: a client absent from the map is absent from the
/// register.
#[derive(Default)]
pub struct ClientRegister {
    clients: RwLock<HashMap<ClientId, Arc<Client>>>,
    subscriptions: SubscriptionRegister,
}

impl ClientRegister {
    pub fn new() -> Self {
        Default::default()
    }

    /// Installs `client` under its id. An existing entry under the same id
    /// is taken over: its connection is closed and its subscriptions are
    /// dropped. Rare, because ids are monotonic, but required so that a
    /// wrapped-around id never strands a connection.
    pub fn add_client(&self, client: Arc<Client>) {
        let id = client.id();
        let previous = self.clients.write().insert(id, client);
        if let Some(previous) = previous {
            debug!("Identity takeover for client-{id}");
            previous.close();
            self.subscriptions.remove_all(id);
        }
    }

    pub fn get_client(&self, client_id: ClientId) -> Option<Arc<Client>> {
        self.clients.read().get(&client_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    /// Records `patterns` for `client` in both the client's own set and the
    /// subscription register.
    pub fn add_subscription(&self, client: &Arc<Client>, patterns: &[String]) {
        client.subscribe(patterns);
        self.subscriptions.add_subscription(client.id(), patterns);
    }

    /// Removes `patterns` from both the client's own set and the register.
    pub fn remove_subscription(&self, client: &Arc<Client>, patterns: &[String]) {
        client.unsubscribe(patterns);
        self.subscriptions.remove_subscription(client.id(), patterns);
    }

    pub fn subscriptions(&self) -> &SubscriptionRegister {
        &self.subscriptions
    }

    /// Fans `message` out to every subscriber whose patterns match its
    /// channel. A subscriber matching through several patterns receives the
    /// message once. Returns the number of recipients attempted.
    pub fn publish(&self, message: &Message) -> usize {
        let channel = message.channel();
        let recipients: Vec<Arc<Client>> = {
            let clients = self.clients.read();
            let mut seen = HashSet::new();
            self.subscriptions
                .subscribers(&channel.expand())
                .into_iter()
                .filter(|id| seen.insert(*id))
                .filter_map(|id| clients.get(&id).cloned())
                .collect()
        };

        if recipients.is_empty() {
            return 0;
        }
        debug!(
            "Fan-out on {} to {} recipients",
            channel,
            recipients.len()
        );
        for client in &recipients {
            client.send(message.clone(), None);
        }
        recipients.len()
    }

    /// Sweeps the register: snapshots-and-resets every client's counters,
    /// removes clients that report reapable, and unregisters their pattern
    /// sets.
    ///
    /// The walk runs under the read lock so the publish hot path is not
    /// blocked; only the final removal promotes to the write lock.
    pub fn reap(&self) -> ReapTotals {
        let mut totals = ReapTotals::default();

        let dead: Vec<(ClientId, Vec<String>)> = {
            let clients = self.clients.read();
            let mut dead = Vec::new();
            for (id, client) in clients.iter() {
                if client.should_reap() {
                    dead.push((*id, client.subscriptions()));
                }
                let counters = client.reset_counters();
                totals.sent += counters.sent;
                totals.failed += counters.failed;
            }
            totals.clients = (clients.len() - dead.len()) as u64;
            dead
        };

        if !dead.is_empty() {
            let mut clients = self.clients.write();
            for (id, patterns) in dead {
                debug!("Reaping client-{id}");
                self.subscriptions.remove_subscription(id, &patterns);
                clients.remove(&id);
            }
        }

        totals.subscriber_by_pattern = self.subscriptions.pattern_count();
        totals
    }
}
