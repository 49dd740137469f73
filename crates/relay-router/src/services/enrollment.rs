//! Node enrollment.
//!
//! A new node obtains its `(node_key, node_secret)` pair by presenting one
//! of two credentials to `POST /public/join`:
//!
//! - a router-signed challenge `ts:nonce:sig`, valid for a bounded window
//!   and usable once per nonce;
//! - a minted one-shot token, deleted on first lookup whether or not it was
//!   still valid.
//!
//! Both stores are TTL maps swept by the background sweeper.

use crate::errors::RouterError;
use crate::registry::{NewNode, NodeRegistry};
use common::clock::Clock;
use common::secret::{ExposeSecret, SecretString};
use common::signing::JoinChallenge;
use common::types;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Random bytes in a challenge nonce.
pub const CHALLENGE_NONCE_BYTES: usize = 16;

/// Random bytes in a one-shot token (48 hex chars).
pub const JOIN_TOKEN_BYTES: usize = 24;

/// Random bytes in a node secret (64 hex chars).
pub const NODE_SECRET_BYTES: usize = 32;

/// Minimum one-shot token lifetime.
pub const MIN_TOKEN_TTL_MS: u64 = 60_000;

/// Attempts at drawing an unused node key before giving up.
const NODE_KEY_ATTEMPTS: usize = 3;

/// A freshly minted one-shot token.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: SecretString,
    pub expires_at: u64,
}

/// Credentials issued to an enrolled node.
#[derive(Debug, Clone)]
pub struct EnrolledNode {
    pub node_key: String,
    pub node_secret: SecretString,
}

/// Enrollment policy knobs.
#[derive(Debug, Clone, Copy)]
pub struct EnrollmentPolicy {
    /// How long after issue a challenge may be redeemed.
    pub challenge_ttl_ms: u64,
    /// How far into the future a challenge timestamp may be.
    pub max_future_skew_ms: u64,
}

#[derive(Debug, Default)]
struct IssuerState {
    /// Redeemed challenge nonces, kept until the challenge would have expired.
    used_nonces: HashMap<String, u64>,
    /// One-shot token -> expiry.
    tokens: HashMap<String, u64>,
}

/// Issues and redeems enrollment credentials.
pub struct EnrollmentIssuer {
    router_secret: SecretString,
    registry: Arc<NodeRegistry>,
    clock: Arc<dyn Clock>,
    policy: EnrollmentPolicy,
    state: Mutex<IssuerState>,
}

impl std::fmt::Debug for EnrollmentIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EnrollmentIssuer")
            .field("policy", &self.policy)
            .field("used_nonces", &state.used_nonces.len())
            .field("tokens", &state.tokens.len())
            .finish_non_exhaustive()
    }
}

impl EnrollmentIssuer {
    pub fn new(
        router_secret: SecretString,
        registry: Arc<NodeRegistry>,
        clock: Arc<dyn Clock>,
        policy: EnrollmentPolicy,
    ) -> Self {
        Self {
            router_secret,
            registry,
            clock,
            policy,
            state: Mutex::new(IssuerState::default()),
        }
    }

    /// Sign a fresh challenge stamped with the current time.
    pub fn issue_challenge(&self) -> JoinChallenge {
        JoinChallenge::issue(
            &self.router_secret,
            self.clock.now_ms(),
            types::random_hex(CHALLENGE_NONCE_BYTES),
        )
    }

    /// Mint a one-shot token living `ttl_ms` (floor 60s).
    ///
    /// # Errors
    ///
    /// `RouterError::Capacity` when `max_live` unexpired tokens already exist.
    pub fn mint_token(&self, ttl_ms: u64, max_live: usize) -> Result<MintedToken, RouterError> {
        let now = self.clock.now_ms();
        let expires_at = now.saturating_add(ttl_ms.max(MIN_TOKEN_TTL_MS));
        let token = types::random_hex(JOIN_TOKEN_BYTES);

        let mut state = self.state.lock();
        let live = state.tokens.values().filter(|&&exp| exp >= now).count();
        if live >= max_live {
            return Err(RouterError::Capacity(format!(
                "{live} join tokens outstanding"
            )));
        }
        state.tokens.insert(token.clone(), expires_at);

        Ok(MintedToken {
            token: SecretString::from(token),
            expires_at,
        })
    }

    /// Redeem a one-shot token. The token is deleted whether or not it was
    /// still valid. Returns whether it was valid.
    pub fn consume_token(&self, token: &str) -> bool {
        let now = self.clock.now_ms();
        self.state
            .lock()
            .tokens
            .remove(token)
            .is_some_and(|exp| exp >= now)
    }

    /// Check a presented challenge: signature, freshness, single use.
    ///
    /// # Errors
    ///
    /// `RouterError::Unauthorized` on any failure.
    pub fn redeem_challenge(&self, challenge: &JoinChallenge) -> Result<(), RouterError> {
        if !challenge.verify(&self.router_secret) {
            return Err(RouterError::Unauthorized(
                "join challenge signature mismatch".to_string(),
            ));
        }

        let now = self.clock.now_ms();
        if challenge.ts > now.saturating_add(self.policy.max_future_skew_ms) {
            return Err(RouterError::Unauthorized(
                "join challenge issued in the future".to_string(),
            ));
        }
        let expires_at = challenge.ts.saturating_add(self.policy.challenge_ttl_ms);
        if expires_at < now {
            return Err(RouterError::Unauthorized("join challenge expired".to_string()));
        }

        let mut state = self.state.lock();
        if state.used_nonces.contains_key(&challenge.nonce) {
            return Err(RouterError::Unauthorized(
                "join challenge already used".to_string(),
            ));
        }
        state
            .used_nonces
            .insert(challenge.nonce.clone(), expires_at);
        Ok(())
    }

    /// Redeem `join_token` (challenge or one-shot token) and register a new
    /// node at `public_url`.
    ///
    /// # Errors
    ///
    /// - `RouterError::BadRequest` - missing token or unusable URL
    /// - `RouterError::Unauthorized` - credential rejected
    /// - `RouterError::Internal` - could not draw an unused node key
    #[instrument(skip_all, name = "router.enroll")]
    pub fn enroll(&self, join_token: &str, public_url: &str) -> Result<EnrolledNode, RouterError> {
        let join_token = join_token.trim();
        let public_url = normalize_public_url(public_url)?;
        if join_token.is_empty() {
            return Err(RouterError::BadRequest("joinToken is required".to_string()));
        }

        match join_token.parse::<JoinChallenge>() {
            Ok(challenge) => self.redeem_challenge(&challenge)?,
            Err(_) => {
                if !self.consume_token(join_token) {
                    return Err(RouterError::Unauthorized(
                        "unknown or expired join token".to_string(),
                    ));
                }
            }
        }

        let now = self.clock.now_ms();
        for _ in 0..NODE_KEY_ATTEMPTS {
            let node_key = types::new_node_key();
            let node_secret = SecretString::from(types::random_hex(NODE_SECRET_BYTES));
            let added = self.registry.add(NewNode {
                key: node_key.clone(),
                public_url: public_url.clone(),
                node_secret: node_secret.clone(),
                last_seen_at: now,
            });
            if added {
                tracing::info!(
                    target: "router.enroll",
                    node_key = %node_key,
                    public_url = %public_url,
                    "Node enrolled"
                );
                return Ok(EnrolledNode {
                    node_key,
                    node_secret,
                });
            }
        }

        Err(RouterError::Internal(
            "node key collision on every attempt".to_string(),
        ))
    }

    /// Drop expired nonces and tokens. Returns how many entries were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        let before = state.used_nonces.len() + state.tokens.len();
        state.used_nonces.retain(|_, exp| *exp >= now);
        state.tokens.retain(|_, exp| *exp >= now);
        before - (state.used_nonces.len() + state.tokens.len())
    }

    /// Unexpired one-shot tokens.
    pub fn live_tokens(&self) -> usize {
        let now = self.clock.now_ms();
        self.state
            .lock()
            .tokens
            .values()
            .filter(|&&exp| exp >= now)
            .count()
    }

    /// Whether the issuer is configured with a usable secret.
    pub fn has_secret(&self) -> bool {
        !self.router_secret.expose_secret().is_empty()
    }
}

fn normalize_public_url(raw: &str) -> Result<String, RouterError> {
    let url = raw.trim().trim_end_matches('/');
    if url.is_empty() {
        return Err(RouterError::BadRequest(
            "nodePublicUrl is required".to_string(),
        ));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(RouterError::BadRequest(
            "nodePublicUrl must be an http(s) URL".to_string(),
        ));
    }
    Ok(url.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::clock::ManualClock;

    const NOW: u64 = 1_700_000_000_000;
    const ROUTER_SECRET: &str = "0123456789abcdef0123456789abcdef";

    struct Fixture {
        issuer: EnrollmentIssuer,
        registry: Arc<NodeRegistry>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(NOW));
        let registry = Arc::new(NodeRegistry::new(clock.clone()));
        let issuer = EnrollmentIssuer::new(
            SecretString::from(ROUTER_SECRET),
            registry.clone(),
            clock.clone(),
            EnrollmentPolicy {
                challenge_ttl_ms: 600_000,
                max_future_skew_ms: 60_000,
            },
        );
        Fixture {
            issuer,
            registry,
            clock,
        }
    }

    #[test]
    fn test_challenge_enrolls_node() {
        let f = fixture();
        let challenge = f.issuer.issue_challenge().to_string();

        let enrolled = f
            .issuer
            .enroll(&challenge, "https://node.example/")
            .unwrap();

        assert!(enrolled.node_key.starts_with("DCN-"));
        assert_eq!(enrolled.node_key.len(), 16);
        assert_eq!(enrolled.node_secret.expose_secret().len(), 64);

        let record = f.registry.get(&enrolled.node_key).unwrap();
        assert_eq!(record.public_url, "https://node.example");
        assert_eq!(record.last_seen_at, NOW);
        assert_eq!(
            record.node_secret.expose_secret(),
            enrolled.node_secret.expose_secret()
        );
    }

    #[test]
    fn test_challenge_single_use() {
        let f = fixture();
        let challenge = f.issuer.issue_challenge().to_string();

        f.issuer.enroll(&challenge, "https://a.example").unwrap();
        let again = f.issuer.enroll(&challenge, "https://b.example");

        assert!(matches!(again, Err(RouterError::Unauthorized(_))));
        assert_eq!(f.registry.len(), 1);
    }

    #[test]
    fn test_challenge_expires() {
        let f = fixture();
        let challenge = f.issuer.issue_challenge().to_string();

        f.clock.advance(600_001);
        assert!(matches!(
            f.issuer.enroll(&challenge, "https://a.example"),
            Err(RouterError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_challenge_from_future_rejected() {
        let f = fixture();
        let forged_ts = JoinChallenge::issue(
            &SecretString::from(ROUTER_SECRET),
            NOW + 60_001,
            "abcd".to_string(),
        );
        assert!(matches!(
            f.issuer.redeem_challenge(&forged_ts),
            Err(RouterError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_challenge_with_wrong_secret_rejected() {
        let f = fixture();
        let forged = JoinChallenge::issue(
            &SecretString::from("not-the-router-secret"),
            NOW,
            "abcd".to_string(),
        );
        assert!(matches!(
            f.issuer.enroll(&forged.to_string(), "https://a.example"),
            Err(RouterError::Unauthorized(_))
        ));
        assert!(f.registry.is_empty());
    }

    #[test]
    fn test_one_shot_token_consumed_once() {
        let f = fixture();
        let minted = f.issuer.mint_token(900_000, 10).unwrap();
        let token = minted.token.expose_secret().to_string();
        assert_eq!(token.len(), 48);

        f.issuer.enroll(&token, "https://a.example").unwrap();
        assert!(matches!(
            f.issuer.enroll(&token, "https://b.example"),
            Err(RouterError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token_is_deleted_on_lookup() {
        let f = fixture();
        let minted = f.issuer.mint_token(60_000, 10).unwrap();
        let token = minted.token.expose_secret().to_string();

        f.clock.advance(60_001);
        assert!(!f.issuer.consume_token(&token));

        // Even rewinding the clock cannot resurrect it.
        f.clock.set(NOW);
        assert!(!f.issuer.consume_token(&token));
    }

    #[test]
    fn test_token_ttl_floor() {
        let f = fixture();
        let minted = f.issuer.mint_token(1, 10).unwrap();
        assert_eq!(minted.expires_at, NOW + MIN_TOKEN_TTL_MS);
    }

    #[test]
    fn test_mint_respects_capacity() {
        let f = fixture();
        f.issuer.mint_token(60_000, 2).unwrap();
        f.issuer.mint_token(60_000, 2).unwrap();
        assert!(matches!(
            f.issuer.mint_token(60_000, 2),
            Err(RouterError::Capacity(_))
        ));

        // Expired tokens do not count against the cap.
        f.clock.advance(60_001);
        f.issuer.mint_token(60_000, 2).unwrap();
    }

    #[test]
    fn test_sweep_removes_expired_entries() {
        let f = fixture();
        f.issuer.mint_token(60_000, 10).unwrap();
        let challenge = f.issuer.issue_challenge();
        f.issuer.redeem_challenge(&challenge).unwrap();

        assert_eq!(f.issuer.sweep(), 0);
        f.clock.advance(600_001);
        assert_eq!(f.issuer.sweep(), 2);
        assert_eq!(f.issuer.live_tokens(), 0);
    }

    #[test]
    fn test_enroll_validates_inputs() {
        let f = fixture();
        assert!(matches!(
            f.issuer.enroll("", "https://a.example"),
            Err(RouterError::BadRequest(_))
        ));
        assert!(matches!(
            f.issuer.enroll("token", "  "),
            Err(RouterError::BadRequest(_))
        ));
        assert!(matches!(
            f.issuer.enroll("token", "ftp://a.example"),
            Err(RouterError::BadRequest(_))
        ));
    }

    #[test]
    fn test_garbage_token_unauthorized() {
        let f = fixture();
        assert!(matches!(
            f.issuer.enroll("1:2", "https://a.example"),
            Err(RouterError::Unauthorized(_))
        ));
    }
}
