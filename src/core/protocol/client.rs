// src/core/protocol/client.rs

//! Per-client state: the current connection, the parked poll response, the
//! subscription set, and the send decision.

use super::connection::Connection;
use super::message::{ClientId, Message};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// A client older than this is eligible for the session-age reap heuristic.
const REAP_MIN_AGE: Duration = Duration::from_secs(60);
/// A client whose most recent poll session is older than this is considered
/// abandoned even if its connection object still reports live.
const REAP_MAX_SESSION_AGE: Duration = Duration::from_secs(2 * 60 * 60);

/// Snapshot of a client's delivery counters, taken by `reset_counters`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientCounters {
    pub sent: u64,
    pub failed: u64,
}

/// One `/meta/connect` exchange: the connection it arrived on, the reply
/// held for it, and when it started. The deferred completion task flushes
/// the reply when the poll timeout elapses.
struct Session {
    conn: Arc<dyn Connection>,
    response: Message,
    started: Instant,
}

impl Session {
    fn end(&self, client_id: ClientId) {
        if self.conn.is_connected() {
            if let Err(e) = self.conn.send(vec![self.response.clone()]) {
                debug!("Flushing poll for client-{client_id} failed: {e}");
            }
        } else {
            debug!("No longer connected: client-{client_id}");
        }
    }
}

struct ClientInner {
    connection: Option<Arc<dyn Connection>>,
    /// The response envelope prepared by the most recent `/meta/connect`.
    parked: Option<Message>,
    subscriptions: HashSet<String>,
    last_session: Option<Arc<Session>>,
}

/// A connected client. Owned by the client register; shared with transport
/// tasks through `Arc`.
pub struct Client {
    id: ClientId,
    created: Instant,
    sent: AtomicU64,
    failed: AtomicU64,
    inner: RwLock<ClientInner>,
}

impl Client {
    pub fn new(id: ClientId) -> Self {
        Self {
            id,
            created: Instant::now(),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            inner: RwLock::new(ClientInner {
                connection: None,
                parked: None,
                subscriptions: HashSet::new(),
                last_session: None,
            }),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Handles a `/meta/connect`: parks `response` as the client's envelope
    /// and records the session.
    ///
    /// On a single-shot connection the response is held until either the
    /// next send completes the poll or the deferred completion task flushes
    /// it at `timeout_ms`. On a streaming connection the response is
    /// delivered immediately.
    pub fn connect(
        &self,
        timeout_ms: u64,
        _interval_ms: u64,
        response: Message,
        conn: Arc<dyn Connection>,
    ) {
        let session = Arc::new(Session {
            conn: Arc::clone(&conn),
            response: response.clone(),
            started: Instant::now(),
        });
        {
            let mut inner = self.inner.write();
            inner.parked = Some(response);
            inner.last_session = Some(Arc::clone(&session));
        }

        if conn.is_single_shot() {
            if timeout_ms > 0 {
                let client_id = self.id;
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
                    session.end(client_id);
                });
            }
        } else if let Err(e) = conn.send(vec![session.response.clone()]) {
            debug!("Connect reply to client-{} failed: {e}", self.id);
        }
    }

    /// Installs `connection` unless a live, higher-priority one is already
    /// in place. A client briefly polling while its socket is intact must
    /// not downgrade the delivery path; a dead connection is always
    /// replaced.
    pub fn set_connection(&self, connection: Arc<dyn Connection>) {
        let mut inner = self.inner.write();
        match &inner.connection {
            Some(current)
                if current.is_connected() && connection.priority() <= current.priority() => {}
            _ => inner.connection = Some(connection),
        }
    }

    /// Delivers `message` through the current connection, appending the
    /// parked envelope when the connection is single-shot so the poll is
    /// completed in the same write. Returns whether delivery succeeded.
    ///
    /// The inner write lock is held across the (non-blocking) transport
    /// hand-off, which serialises sends to one client and preserves enqueue
    /// order.
    pub fn send(&self, message: Message, jsonp: Option<&str>) -> bool {
        let mut inner = self.inner.write();

        let conn = match &inner.connection {
            Some(conn) if conn.is_connected() => Arc::clone(conn),
            _ => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                debug!("Not connected: client-{}", self.id);
                return false;
            }
        };

        let mut batch = vec![message];
        if conn.is_single_shot() {
            if let Some(parked) = inner.parked.take() {
                batch.push(parked);
            }
        }
        debug!("Sending {} msgs to client-{}", batch.len(), self.id);

        let result = match jsonp {
            Some(callback) if !callback.is_empty() => conn.send_jsonp(batch, callback),
            _ => conn.send(batch),
        };

        match result {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                debug!("Was unable to send to client-{}: {e}", self.id);
                conn.close();
                self.failed.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn subscribe(&self, patterns: &[String]) {
        let mut inner = self.inner.write();
        inner.subscriptions.extend(patterns.iter().cloned());
    }

    pub fn unsubscribe(&self, patterns: &[String]) {
        let mut inner = self.inner.write();
        for pattern in patterns {
            inner.subscriptions.remove(pattern);
        }
    }

    /// Snapshot of the client's subscription set, used by the reaper to
    /// unregister the client from every pattern it holds.
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.read().subscriptions.iter().cloned().collect()
    }

    /// Atomically swaps the delivery counters to zero and returns the values
    /// accumulated since the previous reset.
    pub fn reset_counters(&self) -> ClientCounters {
        ClientCounters {
            sent: self.sent.swap(0, Ordering::Relaxed),
            failed: self.failed.swap(0, Ordering::Relaxed),
        }
    }

    /// True when the client should be collected by the next reap sweep.
    /// The primary rule is connection liveness; a stale poll session on an
    /// old client also qualifies.
    pub fn should_reap(&self) -> bool {
        let inner = self.inner.read();
        let connected = inner
            .connection
            .as_ref()
            .is_some_and(|conn| conn.is_connected());
        if !connected {
            return true;
        }

        if self.created.elapsed() > REAP_MIN_AGE {
            if let Some(session) = &inner.last_session {
                if session.started.elapsed() > REAP_MAX_SESSION_AGE {
                    return true;
                }
            }
        }
        false
    }

    /// Releases the current connection. Idempotent.
    pub fn close(&self) {
        let conn = self.inner.write().connection.take();
        if let Some(conn) = conn {
            conn.close();
        }
    }
}
