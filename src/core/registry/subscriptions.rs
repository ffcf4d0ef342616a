// src/core/registry/subscriptions.rs

//! The bidirectional index between subscribers and channel patterns.

use crate::core::protocol::ClientId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// Both directions of the subscription mapping. A single lock guards the
/// pair so the bidirectional invariant is maintained atomically:
/// `p ∈ patterns_by_subscriber[c]` iff `c ∈ subscriber_by_pattern[p]`.
#[derive(Default)]
struct Indices {
    subscriber_by_pattern: HashMap<String, HashSet<ClientId>>,
    patterns_by_subscriber: HashMap<ClientId, HashSet<String>>,
}

/// Maps channel patterns to their subscribers and back. Publish fan-out
/// lookups vastly outnumber subscription changes, so reads take a shared
/// lock and the map sizes are mirrored into atomics for lock-free
/// statistics reads.
#[derive(Default)]
pub struct SubscriptionRegister {
    indices: RwLock<Indices>,
    subscriber_by_pattern_count: AtomicU64,
    patterns_by_subscriber_count: AtomicU64,
}

impl SubscriptionRegister {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records `subscriber` under each of `patterns`, in both directions.
    pub fn add_subscription(&self, subscriber: ClientId, patterns: &[String]) {
        if patterns.is_empty() {
            return;
        }
        let mut indices = self.indices.write();
        for pattern in patterns {
            indices
                .subscriber_by_pattern
                .entry(pattern.clone())
                .or_default()
                .insert(subscriber);
            indices
                .patterns_by_subscriber
                .entry(subscriber)
                .or_default()
                .insert(pattern.clone());
        }
        self.update_counts(&indices);
    }

    /// Removes each (subscriber, pattern) pair from both directions.
    /// Emptied buckets are pruned so the per-pattern subscriber count stays
    /// accurate and memory stays bounded.
    pub fn remove_subscription(&self, subscriber: ClientId, patterns: &[String]) {
        if patterns.is_empty() {
            return;
        }
        let mut indices = self.indices.write();
        for pattern in patterns {
            if let Some(subscribers) = indices.subscriber_by_pattern.get_mut(pattern) {
                subscribers.remove(&subscriber);
                if subscribers.is_empty() {
                    indices.subscriber_by_pattern.remove(pattern);
                }
            }
            if let Some(subscribed) = indices.patterns_by_subscriber.get_mut(&subscriber) {
                subscribed.remove(pattern);
                if subscribed.is_empty() {
                    indices.patterns_by_subscriber.remove(&subscriber);
                }
            }
        }
        self.update_counts(&indices);
    }

    /// Returns the union of the subscriber buckets for `patterns`. A
    /// subscriber appears at most once per pattern but may appear once per
    /// matching pattern; callers needing at-most-once delivery de-duplicate.
    pub fn subscribers(&self, patterns: &[String]) -> Vec<ClientId> {
        let indices = self.indices.read();
        let mut subscribers = Vec::new();
        for pattern in patterns {
            if let Some(bucket) = indices.subscriber_by_pattern.get(pattern) {
                subscribers.extend(bucket.iter().copied());
            }
        }
        subscribers
    }

    /// Removes `subscriber` from every pattern it appears in, and from the
    /// reverse index. Used when a client is taken over or reaped.
    pub fn remove_all(&self, subscriber: ClientId) {
        let mut indices = self.indices.write();
        if let Some(patterns) = indices.patterns_by_subscriber.remove(&subscriber) {
            for pattern in patterns {
                if let Some(subscribers) = indices.subscriber_by_pattern.get_mut(&pattern) {
                    subscribers.remove(&subscriber);
                    if subscribers.is_empty() {
                        indices.subscriber_by_pattern.remove(&pattern);
                    }
                }
            }
        }
        self.update_counts(&indices);
    }

    /// Number of patterns with at least one subscriber.
    pub fn pattern_count(&self) -> u64 {
        self.subscriber_by_pattern_count.load(Ordering::Relaxed)
    }

    /// Number of subscribers holding at least one pattern.
    pub fn subscriber_count(&self) -> u64 {
        self.patterns_by_subscriber_count.load(Ordering::Relaxed)
    }

    fn update_counts(&self, indices: &Indices) {
        self.subscriber_by_pattern_count
            .store(indices.subscriber_by_pattern.len() as u64, Ordering::Relaxed);
        self.patterns_by_subscriber_count.store(
            indices.patterns_by_subscriber.len() as u64,
            Ordering::Relaxed,
        );
    }
}
