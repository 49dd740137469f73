//! Node identity.
//!
//! A node needs a `(node_key, node_secret)` pair before it can heartbeat or
//! verify session tokens. Sources, in order:
//!
//! 1. `NODE_KEY` / `NODE_SECRET` from the environment
//! 2. `<data_dir>/node.credentials.json` from an earlier enrollment
//! 3. Enrollment with the router, using `NODE_JOIN_TOKEN` if set and a
//!    freshly fetched challenge otherwise. The result is persisted.

use crate::config::Config;
use crate::errors::NodeError;
use crate::router_client::RouterClient;
use common::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

#[derive(Clone)]
pub struct NodeCredentials {
    pub node_key: String,
    pub node_secret: SecretString,
}

impl std::fmt::Debug for NodeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCredentials")
            .field("node_key", &self.node_key)
            .field("node_secret", &"[REDACTED]")
            .finish()
    }
}

/// Where the credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    File,
    Enrolled,
}

impl CredentialSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialSource::Environment => "environment",
            CredentialSource::File => "file",
            CredentialSource::Enrolled => "enrolled",
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsFile {
    node_key: String,
    node_secret: String,
}

/// Read persisted credentials. `Ok(None)` if the file does not exist.
///
/// # Errors
///
/// `NodeError::Io` on read failure, `NodeError::Internal` if the file is
/// malformed. A malformed file is never silently replaced: re-enrolling
/// would mint a new node identity.
pub async fn load(path: &Path) -> Result<Option<NodeCredentials>, NodeError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(NodeError::Io(e)),
    };

    let file: CredentialsFile = serde_json::from_slice(&raw).map_err(|e| {
        NodeError::Internal(format!("malformed credentials at {}: {e}", path.display()))
    })?;
    if file.node_key.is_empty() || file.node_secret.is_empty() {
        return Err(NodeError::Internal(format!(
            "incomplete credentials at {}",
            path.display()
        )));
    }

    Ok(Some(NodeCredentials {
        node_key: file.node_key,
        node_secret: SecretString::from(file.node_secret),
    }))
}

/// Atomically write credentials with owner-only permissions.
pub async fn save(path: &Path, creds: &NodeCredentials) -> Result<(), NodeError> {
    let body = serde_json::to_vec_pretty(&CredentialsFile {
        node_key: creds.node_key.clone(),
        node_secret: creds.node_secret.expose_secret().to_string(),
    })
    .map_err(|e| NodeError::Internal(format!("failed to encode credentials: {e}")))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &body).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
    }

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Resolve this node's credentials, enrolling if nothing is configured.
///
/// # Errors
///
/// Fails if the credentials file is unreadable, or enrollment is needed and
/// the router refuses it or cannot be reached.
#[instrument(skip_all, name = "node.credentials")]
pub async fn resolve(
    config: &Config,
    router: &RouterClient,
) -> Result<(NodeCredentials, CredentialSource), NodeError> {
    if let (Some(node_key), Some(node_secret)) = (&config.node_key, &config.node_secret) {
        return Ok((
            NodeCredentials {
                node_key: node_key.clone(),
                node_secret: node_secret.clone(),
            },
            CredentialSource::Environment,
        ));
    }

    let path = config.credentials_path();
    if let Some(creds) = load(&path).await? {
        return Ok((creds, CredentialSource::File));
    }

    let join_token = match &config.join_token {
        Some(token) => token.clone(),
        None => {
            info!(target: "node.credentials", router = %router.base_url(), "Fetching join challenge");
            SecretString::from(router.fetch_challenge().await?.join_token)
        }
    };

    let (node_key, node_secret) = router.enroll(&join_token, &config.public_url).await?;
    let creds = NodeCredentials {
        node_key,
        node_secret,
    };
    save(&path, &creds).await?;

    info!(
        target: "node.credentials",
        node_key = %creds.node_key,
        path = %path.display(),
        "Enrolled with router"
    );
    Ok((creds, CredentialSource::Enrolled))
}
