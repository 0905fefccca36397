//! Per-key expiry tracking for the in-memory cache.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks an expiry deadline for each key.
///
/// A `None` deadline never expires; it stands for TTLs too long for the
/// monotonic clock to represent.
#[derive(Debug, Default)]
pub struct TtlTracker {
    deadlines: HashMap<String, Option<Instant>>,
}

impl TtlTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the expiry clock for a key.
    pub fn set(&mut self, key: &str, ttl: Duration) {
        self.deadlines
            .insert(key.to_string(), Instant::now().checked_add(ttl));
    }

    /// Whether a key has expired. Untracked keys count as expired.
    pub fn is_expired(&self, key: &str) -> bool {
        match self.deadlines.get(key) {
            None => true,
            Some(deadline) => deadline.is_some_and(|d| Instant::now() >= d),
        }
    }

    /// Stop tracking a key.
    pub fn remove(&mut self, key: &str) {
        self.deadlines.remove(key);
    }

    /// Get all expired keys.
    pub fn get_expired(&self) -> Vec<String> {
        let now = Instant::now();
        self.deadlines
            .iter()
            .filter(|(_, deadline)| deadline.is_some_and(|d| now >= d))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Remove all expired entries and return their keys.
    pub fn drain_expired(&mut self) -> Vec<String> {
        let expired = self.get_expired();
        for key in &expired {
            self.deadlines.remove(key);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }
}
