//! Durable registry snapshot.
//!
//! The registry is persisted as one versioned JSON document rewritten in
//! full on every flush. Writes go to `<file>.tmp` and are renamed into
//! place, so a crash mid-write leaves the previous snapshot intact.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors reading or writing the snapshot. Never surfaced to a request.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed snapshot {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

/// On-disk document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    #[serde(default)]
    pub saved_at: u64,
    #[serde(default)]
    pub nodes: Vec<PersistedNode>,
}

/// On-disk node record. The secret is stored in the clear; the file is
/// created with owner-only permissions.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedNode {
    pub key: String,
    pub public_url: String,
    pub node_secret: String,
    pub rooms_active: u64,
    pub users_active: u64,
    pub created_at: u64,
    pub last_seen_at: u64,
}

impl std::fmt::Debug for PersistedNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedNode")
            .field("key", &self.key)
            .field("public_url", &self.public_url)
            .field("node_secret", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("last_seen_at", &self.last_seen_at)
            .finish_non_exhaustive()
    }
}

/// Read a snapshot. Returns `Ok(None)` when the file does not exist yet.
pub fn read_snapshot(path: &Path) -> Result<Option<Snapshot>, PersistenceError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let snapshot: Snapshot =
        serde_json::from_str(&raw).map_err(|source| PersistenceError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(PersistenceError::UnsupportedVersion(snapshot.version));
    }

    Ok(Some(snapshot))
}

/// Atomically replace the snapshot at `path`.
pub async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), PersistenceError> {
    let body = serde_json::to_vec_pretty(snapshot)?;
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &body).await.map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(io_err)?;
    }

    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
