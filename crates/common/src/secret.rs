//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports [`secrecy`] types. Node secrets, the router's enrollment
//! secret and minted session tokens travel in `SecretString` so that a
//! derived `Debug` on any struct holding them prints `[REDACTED]`.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct NodeCredentials {
//!     node_key: String,
//!     node_secret: SecretString,
//! }
//!
//! let creds = NodeCredentials {
//!     node_key: "DCN-0A1B2C3D4E5F".to_string(),
//!     node_secret: SecretString::from("f00d"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("f00d"));
//! assert_eq!(creds.node_secret.expose_secret(), "f00d");
//! ```
//!
//! Secrets deserialize from JSON directly (the `serde` feature is enabled),
//! which is how enrollment responses and credential files are read.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("hunter2");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("node-secret");
        assert_eq!(secret.expose_secret(), "node-secret");
    }

    #[test]
    fn test_deserialize_node_credentials() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Credentials {
            node_key: String,
            node_secret: SecretString,
        }

        let json = r#"{"nodeKey": "DCN-ABC", "nodeSecret": "my-secret-value"}"#;
        let creds: Credentials = serde_json::from_str(json).expect("deserialize");

        assert_eq!(creds.node_secret.expose_secret(), "my-secret-value");

        let debug = format!("{creds:?}");
        assert!(!debug.contains("my-secret-value"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_clone_works() {
        let secret = SecretString::from("cloneable");
        let cloned = secret.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
