// src/core/metrics.rs

//! Defines and registers Prometheus metrics for server monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use crate::core::engine::Counters;
use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, TextEncoder, register_counter, register_gauge};

lazy_static! {
    // --- Server-wide Gauges ---
    /// The number of clients held by the register, sampled at each reap tick.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("bayeuxd_connected_clients", "Number of clients in the register at the last reap tick.").unwrap();
    /// The number of channel patterns with at least one subscriber.
    pub static ref SUBSCRIPTION_PATTERNS: Gauge =
        register_gauge!("bayeuxd_subscription_patterns", "Number of channel patterns with at least one subscriber.").unwrap();

    // --- Server-wide Counters ---
    /// The total number of transport connections accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("bayeuxd_connections_received_total", "Total number of connections received (socket upgrades and polls).").unwrap();
    /// The total number of successful handshakes since startup.
    pub static ref HANDSHAKES_TOTAL: Counter =
        register_counter!("bayeuxd_handshakes_total", "Total number of successful handshakes.").unwrap();
    /// The total number of messages published since startup.
    pub static ref MESSAGES_PUBLISHED_TOTAL: Counter =
        register_counter!("bayeuxd_messages_published_total", "Total number of messages published.").unwrap();
    /// The total number of message deliveries that reached a transport.
    pub static ref MESSAGES_SENT_TOTAL: Counter =
        register_counter!("bayeuxd_messages_sent_total", "Total number of message batches delivered to clients.").unwrap();
    /// The total number of message deliveries that failed.
    pub static ref MESSAGES_FAILED_TOTAL: Counter =
        register_counter!("bayeuxd_messages_failed_total", "Total number of message deliveries that failed.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}

/// Records one statistics sample. The published/sent/failed values are
/// per-tick deltas and accumulate into counters; the rest are gauges.
pub fn record_counters(counters: &Counters) {
    MESSAGES_PUBLISHED_TOTAL.inc_by(counters.published as f64);
    MESSAGES_SENT_TOTAL.inc_by(counters.sent as f64);
    MESSAGES_FAILED_TOTAL.inc_by(counters.failed as f64);
    CONNECTED_CLIENTS.set(counters.clients as f64);
    SUBSCRIPTION_PATTERNS.set(counters.subscriber_by_pattern as f64);
}
