//! Sticky room mapping.
//!
//! Pins a room to the node that first served it for a bounded TTL, so that
//! reconnecting clients land on the same host. An entry is never honored
//! past its expiry: `get` deletes expired entries lazily and the sweeper
//! task removes the rest.

use common::clock::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StickyEntry {
    node_key: String,
    expires_at: u64,
}

impl StickyEntry {
    fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at < now_ms
    }
}

/// TTL-bounded `room_id -> node_key` map.
#[derive(Debug)]
pub struct StickyMap {
    entries: Mutex<HashMap<String, StickyEntry>>,
    ttl_ms: u64,
    clock: Arc<dyn Clock>,
}

impl StickyMap {
    /// Create a map whose `set` uses `ttl_ms`.
    pub fn new(ttl_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_ms,
            clock,
        }
    }

    /// Mapped node for `room_id`, or `None` if absent or expired.
    pub fn get(&self, room_id: &str) -> Option<String> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();
        let entry = entries.get(room_id)?;
        if entry.is_expired(now) {
            entries.remove(room_id);
            return None;
        }
        Some(entry.node_key.clone())
    }

    /// Map `room_id` to `node_key` for the default TTL, overwriting any entry.
    pub fn set(&self, room_id: &str, node_key: &str) {
        self.set_with_ttl(room_id, node_key, self.ttl_ms);
    }

    /// Map `room_id` to `node_key` for `ttl_ms`.
    pub fn set_with_ttl(&self, room_id: &str, node_key: &str, ttl_ms: u64) {
        let expires_at = self.clock.now_ms().saturating_add(ttl_ms);
        self.entries.lock().insert(
            room_id.to_string(),
            StickyEntry {
                node_key: node_key.to_string(),
                expires_at,
            },
        );
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    /// Number of unexpired entries.
    pub fn live_count(&self) -> usize {
        let now = self.clock.now_ms();
        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    /// Number of stored entries, expired or not.
    pub fn stored_count(&self) -> usize {
        self.entries.lock().len()
    }
}
