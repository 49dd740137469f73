//! HMAC-SHA256 signing and verification for relay credentials.
//!
//! Three credentials share one primitive, `HMAC-SHA256(secret, payload)`
//! rendered as lower-case hex:
//!
//! - **Heartbeat**: `HMAC(node_secret, node_key|public_url|rooms|users|ts)`
//! - **Session token**: `HMAC(node_secret, room_id|user_id|node_key)`
//! - **Join challenge**: `HMAC(router_secret, ts:nonce)`, carried as `ts:nonce:sig`
//!
//! Nothing here holds state. The router and a node each recompute the same
//! value from their own copy of the secret; verification compares in
//! constant time via `ring::hmac::verify`.

use crate::error::SigningError;
use crate::secret::{ExposeSecret, SecretString};
use ring::hmac;
use std::fmt;
use std::str::FromStr;

/// Maximum accepted distance between a heartbeat timestamp and the receiver's clock.
pub const DEFAULT_MAX_SKEW_MS: u64 = 60_000;

/// Compute `HMAC-SHA256(secret, payload)` as lower-case hex.
#[must_use]
pub fn sign(secret: &[u8], payload: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    hex::encode(hmac::sign(&key, payload).as_ref())
}

/// Verify a hex signature over `payload` in constant time.
///
/// Returns `false` for non-hex or wrong-length signatures.
#[must_use]
pub fn verify(secret: &[u8], payload: &[u8], signature_hex: &str) -> bool {
    let Ok(provided) = hex::decode(signature_hex) else {
        return false;
    };
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    hmac::verify(&key, payload, &provided).is_ok()
}

/// Payload bound by a session token.
#[must_use]
pub fn session_payload(room_id: &str, user_id: &str, node_key: &str) -> String {
    format!("{room_id}|{user_id}|{node_key}")
}

/// Mint the session token authorizing `user_id` to join `room_id` on `node_key`.
#[must_use]
pub fn sign_session_token(
    node_secret: &SecretString,
    room_id: &str,
    user_id: &str,
    node_key: &str,
) -> String {
    sign(
        node_secret.expose_secret().as_bytes(),
        session_payload(room_id, user_id, node_key).as_bytes(),
    )
}

/// Check a presented session token against the claimed handshake fields.
#[must_use]
pub fn verify_session_token(
    node_secret: &SecretString,
    room_id: &str,
    user_id: &str,
    node_key: &str,
    token: &str,
) -> bool {
    verify(
        node_secret.expose_secret().as_bytes(),
        session_payload(room_id, user_id, node_key).as_bytes(),
        token,
    )
}

/// Fields covered by a heartbeat signature, in signing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatFields<'a> {
    pub node_key: &'a str,
    pub public_url: &'a str,
    pub rooms_active: u64,
    pub users_active: u64,
    pub ts: u64,
}

impl HeartbeatFields<'_> {
    /// `node_key|public_url|rooms_active|users_active|ts`
    #[must_use]
    pub fn payload(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.node_key, self.public_url, self.rooms_active, self.users_active, self.ts
        )
    }

    /// Sign these fields with the node's secret.
    #[must_use]
    pub fn sign(&self, node_secret: &SecretString) -> String {
        sign(
            node_secret.expose_secret().as_bytes(),
            self.payload().as_bytes(),
        )
    }

    /// Verify a heartbeat signature. Does not check timestamp freshness.
    #[must_use]
    pub fn verify(&self, node_secret: &SecretString, sig: &str) -> bool {
        verify(
            node_secret.expose_secret().as_bytes(),
            self.payload().as_bytes(),
            sig,
        )
    }
}

/// Whether `ts_ms` lies within `max_skew_ms` of `now_ms`, in either direction.
#[must_use]
pub fn within_skew(now_ms: u64, ts_ms: u64, max_skew_ms: u64) -> bool {
    now_ms.abs_diff(ts_ms) <= max_skew_ms
}

/// Router-signed enrollment challenge, serialized as `ts:nonce:sig`.
#[derive(Clone, PartialEq, Eq)]
pub struct JoinChallenge {
    pub ts: u64,
    pub nonce: String,
    pub sig: String,
}

impl JoinChallenge {
    /// Sign a fresh challenge for `(ts, nonce)`.
    #[must_use]
    pub fn issue(router_secret: &SecretString, ts: u64, nonce: String) -> Self {
        let sig = sign(
            router_secret.expose_secret().as_bytes(),
            Self::payload(ts, &nonce).as_bytes(),
        );
        Self { ts, nonce, sig }
    }

    /// Verify the signature. Freshness and single use are the issuer's job.
    #[must_use]
    pub fn verify(&self, router_secret: &SecretString) -> bool {
        verify(
            router_secret.expose_secret().as_bytes(),
            Self::payload(self.ts, &self.nonce).as_bytes(),
            &self.sig,
        )
    }

    fn payload(ts: u64, nonce: &str) -> String {
        format!("{ts}:{nonce}")
    }
}

impl fmt::Display for JoinChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.ts, self.nonce, self.sig)
    }
}

impl fmt::Debug for JoinChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinChallenge")
            .field("ts", &self.ts)
            .field("nonce", &self.nonce)
            .field("sig", &"[REDACTED]")
            .finish()
    }
}

impl FromStr for JoinChallenge {
    type Err = SigningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(ts), Some(nonce), Some(sig), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SigningError::MalformedChallenge);
        };
        if nonce.is_empty() || sig.is_empty() {
            return Err(SigningError::MalformedChallenge);
        }
        let ts = ts.parse().map_err(|_| SigningError::MalformedChallenge)?;
        Ok(Self {
            ts,
            nonce: nonce.to_string(),
            sig: sig.to_string(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn test_sign_is_hex_sha256() {
        let sig = sign(b"k", b"payload");
        assert_eq!(sig.len(), 64);
        assert!(hex::decode(&sig).is_ok());
    }

    #[test]
    fn test_sign_matches_known_vector() {
        // RFC 4231 test case 2
        let sig = sign(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_session_token_verifies_with_same_fields() {
        let s = secret("shared-node-secret");
        let token = sign_session_token(&s, "R1", "U1", "NODEA");

        assert_eq!(token, sign(b"shared-node-secret", b"R1|U1|NODEA"));
        assert!(verify_session_token(&s, "R1", "U1", "NODEA", &token));
    }

    #[test]
    fn test_session_token_fails_when_any_field_altered() {
        let s = secret("shared-node-secret");
        let token = sign_session_token(&s, "R1", "U1", "NODEA");

        assert!(!verify_session_token(&s, "R2", "U1", "NODEA", &token));
        assert!(!verify_session_token(&s, "R1", "U2", "NODEA", &token));
        assert!(!verify_session_token(&s, "R1", "U1", "NODEB", &token));
        assert!(!verify_session_token(
            &secret("other-secret"),
            "R1",
            "U1",
            "NODEA",
            &token
        ));
    }

    #[test]
    fn test_session_token_field_order_matters() {
        let s = secret("shared-node-secret");
        let token = sign_session_token(&s, "R1", "U1", "NODEA");
        assert!(!verify_session_token(&s, "U1", "R1", "NODEA", &token));
    }

    #[test]
    fn test_verify_rejects_garbage_signatures() {
        assert!(!verify(b"k", b"payload", "not-hex"));
        assert!(!verify(b"k", b"payload", "abcd"));
        assert!(!verify(b"k", b"payload", ""));
    }

    #[test]
    fn test_heartbeat_payload_order() {
        let fields = HeartbeatFields {
            node_key: "DCN-1",
            public_url: "https://n1.example",
            rooms_active: 3,
            users_active: 7,
            ts: 1_700_000_000_000,
        };
        assert_eq!(
            fields.payload(),
            "DCN-1|https://n1.example|3|7|1700000000000"
        );
    }

    #[test]
    fn test_heartbeat_signature_round_trip_and_tamper() {
        let s = secret("node-secret");
        let fields = HeartbeatFields {
            node_key: "DCN-1",
            public_url: "https://n1.example",
            rooms_active: 3,
            users_active: 7,
            ts: 1_700_000_000_000,
        };
        let sig = fields.sign(&s);
        assert!(fields.verify(&s, &sig));

        let tampered = HeartbeatFields {
            users_active: 8,
            ..fields
        };
        assert!(!tampered.verify(&s, &sig));
    }

    #[test]
    fn test_within_skew_is_symmetric_and_inclusive() {
        assert!(within_skew(100_000, 40_000, 60_000));
        assert!(within_skew(40_000, 100_000, 60_000));
        assert!(!within_skew(100_001, 40_000, 60_000));
        assert!(!within_skew(40_000, 100_001, 60_000));
    }

    #[test]
    fn test_join_challenge_round_trip() {
        let s = secret("router-secret-router-secret-0001");
        let challenge = JoinChallenge::issue(&s, 1_700_000_000_000, "abcd".to_string());
        let wire = challenge.to_string();

        let parsed: JoinChallenge = wire.parse().expect("parse");
        assert_eq!(parsed, challenge);
        assert!(parsed.verify(&s));
    }

    #[test]
    fn test_join_challenge_rejects_tampered_ts() {
        let s = secret("router-secret-router-secret-0001");
        let mut challenge = JoinChallenge::issue(&s, 1_700_000_000_000, "abcd".to_string());
        challenge.ts += 1;
        assert!(!challenge.verify(&s));
    }

    #[test]
    fn test_join_challenge_parse_failures() {
        assert!("".parse::<JoinChallenge>().is_err());
        assert!("123:nonce".parse::<JoinChallenge>().is_err());
        assert!("abc:nonce:sig".parse::<JoinChallenge>().is_err());
        assert!("123::sig".parse::<JoinChallenge>().is_err());
        assert!("123:nonce:".parse::<JoinChallenge>().is_err());
        assert!("123:nonce:sig:extra".parse::<JoinChallenge>().is_err());
    }

    #[test]
    fn test_join_challenge_debug_redacts_sig() {
        let s = secret("router-secret-router-secret-0001");
        let challenge = JoinChallenge::issue(&s, 1, "n".to_string());
        let debug = format!("{challenge:?}");
        assert!(!debug.contains(&challenge.sig));
    }
}
