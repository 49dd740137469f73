//! Router enrollment secret.
//!
//! Stored hex-encoded in `<data_dir>/router.secret`. Generated on first boot.

use common::secret::{ExposeSecret, SecretString};
use common::types;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Random bytes in a generated router secret.
pub const ROUTER_SECRET_BYTES: usize = 32;

/// Shortest secret accepted from disk.
pub const MIN_ROUTER_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum RouterSecretError {
    #[error("failed to access router secret at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("router secret at {path} is too short ({len} < {MIN_ROUTER_SECRET_LEN} chars)")]
    TooShort { path: PathBuf, len: usize },
}

/// Read the router secret from `path`, creating it if absent.
///
/// # Errors
///
/// Returns `RouterSecretError::Io` if the file cannot be read or written, or
/// `RouterSecretError::TooShort` if an existing secret is too weak.
pub fn load_or_generate(path: &Path) -> Result<SecretString, RouterSecretError> {
    let io_err = |source| RouterSecretError::Io {
        path: path.to_path_buf(),
        source,
    };

    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let secret = SecretString::from(raw.trim().to_string());
            let len = secret.expose_secret().len();
            if len < MIN_ROUTER_SECRET_LEN {
                return Err(RouterSecretError::TooShort {
                    path: path.to_path_buf(),
                    len,
                });
            }
            info!(target: "router.secret", path = %path.display(), "Loaded router secret");
            Ok(secret)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
            let secret = types::random_hex(ROUTER_SECRET_BYTES);
            std::fs::write(path, format!("{secret}\n")).map_err(io_err)?;
            restrict_permissions(path).map_err(io_err)?;
            info!(target: "router.secret", path = %path.display(), "Generated router secret");
            Ok(SecretString::from(secret))
        }
        Err(e) => Err(io_err(e)),
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
