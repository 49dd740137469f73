//! Node registry.
//!
//! The registry is the router's directory of known nodes: their keys,
//! public addresses, shared secrets and self-reported activity. It owns the
//! durable snapshot; every mutation marks the registry dirty and wakes the
//! flush task (`tasks::registry_flush`), which coalesces writes.
//!
//! Iteration order is insertion order. Allocation relies on this to break
//! latency ties deterministically.
//!
//! # Online state
//!
//! A node is online iff `last_seen_at > 0` and `now - last_seen_at <= ttl`.
//! Loading a snapshot resets every `last_seen_at` to 0, so after a router
//! restart no node counts as online until it heartbeats again.

pub mod snapshot;

use crate::models::PublicNode;
use common::clock::Clock;
use common::secret::{ExposeSecret, SecretString};
use parking_lot::Mutex;
use snapshot::{PersistedNode, PersistenceError, Snapshot, SNAPSHOT_VERSION};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

/// A registered node.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub key: String,
    pub public_url: String,
    pub node_secret: SecretString,
    pub rooms_active: u64,
    pub users_active: u64,
    pub created_at: u64,
    pub last_seen_at: u64,
}

impl NodeRecord {
    /// Whether the node heartbeated within `ttl_ms` of `now_ms`.
    pub fn is_online(&self, now_ms: u64, ttl_ms: u64) -> bool {
        self.last_seen_at > 0 && now_ms.saturating_sub(self.last_seen_at) <= ttl_ms
    }

    /// Whether the node can be issued session tokens.
    pub fn has_secret(&self) -> bool {
        !self.node_secret.expose_secret().is_empty()
    }

    fn to_public(&self, online: bool) -> PublicNode {
        PublicNode {
            key: self.key.clone(),
            public_url: self.public_url.clone(),
            rooms_active: self.rooms_active,
            users_active: self.users_active,
            last_seen_at: self.last_seen_at,
            online,
        }
    }

    fn to_persisted(&self) -> PersistedNode {
        PersistedNode {
            key: self.key.clone(),
            public_url: self.public_url.clone(),
            node_secret: self.node_secret.expose_secret().to_string(),
            rooms_active: self.rooms_active,
            users_active: self.users_active,
            created_at: self.created_at,
            last_seen_at: self.last_seen_at,
        }
    }
}

/// Input to [`NodeRegistry::add`].
#[derive(Debug, Clone)]
pub struct NewNode {
    pub key: String,
    pub public_url: String,
    pub node_secret: SecretString,
    /// Initial `last_seen_at`; 0 means "never seen".
    pub last_seen_at: u64,
}

/// Partial update for [`NodeRegistry::upsert`]. `None` keeps the prior value.
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    pub public_url: Option<String>,
    pub node_secret: Option<SecretString>,
    pub rooms_active: Option<u64>,
    pub users_active: Option<u64>,
    pub last_seen_at: Option<u64>,
}

/// Activity carried by a verified heartbeat.
#[derive(Debug, Clone, Default)]
pub struct ActivityReport {
    pub public_url: Option<String>,
    pub rooms_active: Option<u64>,
    pub users_active: Option<u64>,
}

#[derive(Default)]
struct RegistryState {
    nodes: Vec<NodeRecord>,
    index: HashMap<String, usize>,
}

impl RegistryState {
    fn get_mut(&mut self, key: &str) -> Option<&mut NodeRecord> {
        let idx = *self.index.get(key)?;
        self.nodes.get_mut(idx)
    }

    fn insert(&mut self, record: NodeRecord) {
        self.index.insert(record.key.clone(), self.nodes.len());
        self.nodes.push(record);
    }
}

/// Process-scoped node directory.
pub struct NodeRegistry {
    state: Mutex<RegistryState>,
    clock: Arc<dyn Clock>,
    dirty: AtomicBool,
    changed: Notify,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("nodes", &self.len())
            .field("dirty", &self.dirty.load(Ordering::Relaxed))
            .finish()
    }
}

impl NodeRegistry {
    /// Create an empty registry.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            clock,
            dirty: AtomicBool::new(false),
            changed: Notify::new(),
        }
    }

    /// Load the registry from the snapshot at `path`.
    ///
    /// A missing file starts an empty registry. An unreadable or malformed
    /// file is logged and also starts empty; the next flush replaces it.
    /// Every loaded node starts offline.
    pub fn load(path: &Path, clock: Arc<dyn Clock>) -> Self {
        let registry = Self::new(clock);

        let snapshot = match snapshot::read_snapshot(path) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!(
                    target: "router.registry",
                    path = %path.display(),
                    "No registry snapshot yet (first boot)"
                );
                return registry;
            }
            Err(e) => {
                warn!(
                    target: "router.registry",
                    error = %e,
                    "Failed to load registry snapshot, starting empty"
                );
                return registry;
            }
        };

        let now = registry.clock.now_ms();
        {
            let mut state = registry.state.lock();
            for node in snapshot.nodes {
                if node.key.is_empty() || state.index.contains_key(&node.key) {
                    continue;
                }
                state.insert(NodeRecord {
                    key: node.key,
                    public_url: node.public_url,
                    node_secret: SecretString::from(node.node_secret),
                    rooms_active: node.rooms_active,
                    users_active: node.users_active,
                    created_at: if node.created_at == 0 {
                        now
                    } else {
                        node.created_at
                    },
                    last_seen_at: 0,
                });
            }
        }

        info!(
            target: "router.registry",
            nodes = registry.len(),
            "Loaded registry snapshot"
        );
        registry.mark_dirty();
        registry
    }

    /// Insert a new node. Returns `false` without mutating if the key exists
    /// or is empty.
    pub fn add(&self, node: NewNode) -> bool {
        if node.key.is_empty() {
            return false;
        }
        let now = self.clock.now_ms();
        {
            let mut state = self.state.lock();
            if state.index.contains_key(&node.key) {
                return false;
            }
            state.insert(NodeRecord {
                key: node.key,
                public_url: node.public_url,
                node_secret: node.node_secret,
                rooms_active: 0,
                users_active: 0,
                created_at: now,
                last_seen_at: node.last_seen_at,
            });
        }
        self.mark_dirty();
        true
    }

    /// Create or merge a node. An existing non-empty secret is never replaced
    /// and `created_at` is never changed.
    pub fn upsert(&self, key: &str, patch: NodePatch) -> bool {
        if key.is_empty() {
            return false;
        }
        let now = self.clock.now_ms();
        {
            let mut state = self.state.lock();
            match state.get_mut(key) {
                Some(record) => {
                    if let Some(url) = patch.public_url {
                        record.public_url = url;
                    }
                    if let Some(secret) = patch.node_secret {
                        if !record.has_secret() {
                            record.node_secret = secret;
                        }
                    }
                    if let Some(rooms) = patch.rooms_active {
                        record.rooms_active = rooms;
                    }
                    if let Some(users) = patch.users_active {
                        record.users_active = users;
                    }
                    if let Some(seen) = patch.last_seen_at {
                        record.last_seen_at = record.last_seen_at.max(seen);
                    }
                }
                None => state.insert(NodeRecord {
                    key: key.to_string(),
                    public_url: patch.public_url.unwrap_or_default(),
                    node_secret: patch
                        .node_secret
                        .unwrap_or_else(|| SecretString::from(String::new())),
                    rooms_active: patch.rooms_active.unwrap_or(0),
                    users_active: patch.users_active.unwrap_or(0),
                    created_at: now,
                    last_seen_at: patch.last_seen_at.unwrap_or(0),
                }),
            }
        }
        self.mark_dirty();
        true
    }

    /// Record a heartbeat: stamp `last_seen_at = now` and apply reported
    /// activity. Returns `false` if the key is unknown.
    pub fn mark_seen(&self, key: &str, report: ActivityReport) -> bool {
        let now = self.clock.now_ms();
        {
            let mut state = self.state.lock();
            let Some(record) = state.get_mut(key) else {
                return false;
            };
            if let Some(url) = report.public_url {
                record.public_url = url;
            }
            if let Some(rooms) = report.rooms_active {
                record.rooms_active = rooms;
            }
            if let Some(users) = report.users_active {
                record.users_active = users;
            }
            record.last_seen_at = record.last_seen_at.max(now);
        }
        self.mark_dirty();
        true
    }

    /// Whether `record` is online as of now.
    pub fn is_online(&self, record: &NodeRecord, ttl_ms: u64) -> bool {
        record.is_online(self.clock.now_ms(), ttl_ms)
    }

    /// Look up a node by key.
    pub fn get(&self, key: &str) -> Option<NodeRecord> {
        let state = self.state.lock();
        let idx = *state.index.get(key)?;
        state.nodes.get(idx).cloned()
    }

    /// Online nodes, secrets included, in insertion order.
    pub fn list_internal(&self, ttl_ms: u64) -> Vec<NodeRecord> {
        let now = self.clock.now_ms();
        self.state
            .lock()
            .nodes
            .iter()
            .filter(|n| n.is_online(now, ttl_ms))
            .cloned()
            .collect()
    }

    /// Online nodes without secrets, at most `limit` of them.
    pub fn list_public(&self, ttl_ms: u64, limit: usize) -> Vec<PublicNode> {
        let now = self.clock.now_ms();
        self.state
            .lock()
            .nodes
            .iter()
            .filter(|n| n.is_online(now, ttl_ms))
            .take(limit)
            .map(|n| n.to_public(true))
            .collect()
    }

    /// Number of online nodes.
    pub fn count_online(&self, ttl_ms: u64) -> usize {
        let now = self.clock.now_ms();
        self.state
            .lock()
            .nodes
            .iter()
            .filter(|n| n.is_online(now, ttl_ms))
            .count()
    }

    /// Sum of self-reported `(rooms, users)` across online nodes.
    pub fn online_activity(&self, ttl_ms: u64) -> (u64, u64) {
        let now = self.clock.now_ms();
        self.state
            .lock()
            .nodes
            .iter()
            .filter(|n| n.is_online(now, ttl_ms))
            .fold((0u64, 0u64), |(rooms, users), n| {
                (
                    rooms.saturating_add(n.rooms_active),
                    users.saturating_add(n.users_active),
                )
            })
    }

    /// Number of known nodes, online or not.
    pub fn len(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// Whether no node is known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether there are unflushed changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Resolves after the next mutation (or immediately if one happened since
    /// the last wait).
    pub async fn changed(&self) {
        self.changed.notified().await;
    }

    /// Write the snapshot if dirty. Returns whether a write happened.
    ///
    /// On failure the registry stays dirty so the next flush retries.
    pub async fn flush_to(&self, path: &Path) -> Result<bool, PersistenceError> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }
        let snapshot = self.snapshot();
        if let Err(e) = snapshot::write_snapshot(path, &snapshot).await {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        Ok(true)
    }

    /// Point-in-time copy of every record.
    pub fn snapshot(&self) -> Snapshot {
        let nodes = self
            .state
            .lock()
            .nodes
            .iter()
            .map(NodeRecord::to_persisted)
            .collect();
        Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: self.clock.now_ms(),
            nodes,
        }
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
        self.changed.notify_one();
    }
}
