//! Short-lived RS256 authorization tickets.
//!
//! A ticket binds requester, target worker, and expiry. It is self-contained:
//! the coordinator keeps no record of issued tickets and performs no
//! revocation, and workers verify offline against the distributed public key.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use troop_core::constants::{TICKET_AUDIENCE, TICKET_LIFETIME_SECS};
use troop_core::error::CoordinatorError;
use troop_core::types::{NodeId, PublicKey, Timestamp};

use crate::keys::KeyManager;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TicketClaims {
    /// Requester public key.
    pub sub: String,
    /// The worker authorized to serve this requester.
    pub target_node: String,
    pub aud: String,
    /// Expiry, Unix seconds UTC.
    pub exp: i64,
    /// Tier identifier, e.g. "free-tier".
    pub project: String,
}

/// Mint a ticket for `requester` to reach `target_node`, expiring
/// `TICKET_LIFETIME_SECS` after `now`.
pub fn mint(
    keys: &KeyManager,
    requester: &PublicKey,
    target_node: &NodeId,
    project: &str,
    now: Timestamp,
) -> Result<String, CoordinatorError> {
    let claims = TicketClaims {
        sub: requester.as_str().to_string(),
        target_node: target_node.as_str().to_string(),
        aud: TICKET_AUDIENCE.to_string(),
        exp: now + TICKET_LIFETIME_SECS,
        project: project.to_string(),
    };
    encode(&Header::new(Algorithm::RS256), &claims, keys.encoding_key())
        .map_err(|e| CoordinatorError::KeyMaterial(format!("ticket mint: {e}")))
}

/// Verify a ticket against the coordinator's own public key.
pub fn verify(keys: &KeyManager, token: &str) -> Option<TicketClaims> {
    decode_claims(keys.decoding_key(), token)
}

/// Verify a ticket against a distributed public key PEM, as a worker would.
/// Any failure (signature, audience, expiry, shape) yields `None`.
pub fn verify_with_public_pem(public_pem: &str, token: &str) -> Option<TicketClaims> {
    let key = DecodingKey::from_rsa_pem(public_pem.as_bytes()).ok()?;
    decode_claims(&key, token)
}

fn decode_claims(key: &DecodingKey, token: &str) -> Option<TicketClaims> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[TICKET_AUDIENCE]);
    validation.leeway = 0;
    decode::<TicketClaims>(token, key, &validation)
        .map(|data| data.claims)
        .ok()
}
