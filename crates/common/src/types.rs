//! Identifier generation shared by the router and the nodes.
//!
//! All randomness comes from `ring`'s CSPRNG.

use ring::rand::{SecureRandom, SystemRandom};

/// Prefix for generated room identifiers.
pub const ROOM_ID_PREFIX: &str = "R-";

/// Prefix for generated user identifiers.
pub const USER_ID_PREFIX: &str = "U-";

/// Prefix for minted node keys.
pub const NODE_KEY_PREFIX: &str = "DCN-";

/// Returns `bytes` random bytes, hex-encoded (lower case).
#[must_use]
#[allow(clippy::expect_used)] // CSPRNG fill is an unreachable failure condition
pub fn random_hex(bytes: usize) -> String {
    // SystemRandom draws from the OS entropy source (getrandom/urandom),
    // which only fails if the OS itself is broken.
    let rng = SystemRandom::new();
    let mut buf = vec![0u8; bytes];
    rng.fill(&mut buf).expect("CSPRNG should not fail");
    hex::encode(buf)
}

/// Returns `prefix` followed by `len` upper-case hex characters.
#[must_use]
pub fn random_id(prefix: &str, len: usize) -> String {
    let hex = random_hex(len.div_ceil(2)).to_uppercase();
    let body = hex.get(..len).unwrap_or(&hex);
    format!("{prefix}{body}")
}

/// Generates an opaque room identifier (`R-` + 10 hex chars).
#[must_use]
pub fn new_room_id() -> String {
    random_id(ROOM_ID_PREFIX, 10)
}

/// Generates an opaque user identifier (`U-` + 8 hex chars).
#[must_use]
pub fn new_user_id() -> String {
    random_id(USER_ID_PREFIX, 8)
}

/// Generates a node key (`DCN-` + 12 hex chars).
#[must_use]
pub fn new_node_key() -> String {
    random_id(NODE_KEY_PREFIX, 12)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_hex_length() {
        assert_eq!(random_hex(16).len(), 32);
        assert_eq!(random_hex(32).len(), 64);
    }

    #[test]
    fn test_random_id_shape() {
        let id = random_id("X-", 7);
        assert!(id.starts_with("X-"));
        assert_eq!(id.len(), 9);
        assert!(id
            .trim_start_matches("X-")
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(new_room_id(), new_room_id());
        assert_ne!(new_user_id(), new_user_id());
        assert_ne!(new_node_key(), new_node_key());
    }

    #[test]
    fn test_id_prefixes() {
        assert!(new_room_id().starts_with("R-"));
        assert_eq!(new_room_id().len(), 12);
        assert!(new_user_id().starts_with("U-"));
        assert_eq!(new_user_id().len(), 10);
        assert!(new_node_key().starts_with("DCN-"));
        assert_eq!(new_node_key().len(), 16);
    }
}
