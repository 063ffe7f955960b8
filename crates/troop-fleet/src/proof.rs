//! Proof-of-Hardware protocol.
//!
//! The coordinator never re-executes the benchmark. It hands out a fresh
//! seed, and the submitted proof hash is an opaque commitment whose strength
//! comes from the seed's secrecy and the 60-second redemption window. What
//! the protocol actually establishes is the wall-clock duration, from which
//! the node's credit multiplier is derived.

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use tracing::info;

use troop_core::constants::{
    BENCHMARK_BASELINE_SECS, BENCHMARK_MATRIX_SIZE, CHALLENGE_TTL_SECS,
    HIGH_PERFORMANCE_THRESHOLD, MULTIPLIER_CAP, SYSTEM_OWNER_PUBLIC_KEY,
};
use troop_core::error::CoordinatorError;
use troop_core::types::{NodeId, PublicKey, Timestamp};
use troop_core::{Node, User};
use troop_state::{EphemeralStore, LedgerDb};

const CHALLENGE_KEY_PREFIX: &str = "challenge:";

/// A benchmark challenge handed to a worker.
#[derive(Clone, Debug)]
pub struct Challenge {
    pub challenge_token: String,
    pub seed: String,
    pub matrix_size: u32,
}

/// Outcome of a successful proof verification.
#[derive(Clone, Debug)]
pub struct Verification {
    pub multiplier: f64,
    pub tier: &'static str,
}

pub struct HardwareProver {
    store: Arc<EphemeralStore>,
    db: Arc<LedgerDb>,
}

impl HardwareProver {
    pub fn new(store: Arc<EphemeralStore>, db: Arc<LedgerDb>) -> Self {
        Self { store, db }
    }

    /// Issue a challenge: token and seed are independent 128-bit random hex
    /// strings, redeemable for `CHALLENGE_TTL_SECS`.
    pub fn issue_challenge(&self, node_id: &NodeId) -> Challenge {
        let seed = random_hex128();
        let token = random_hex128();

        self.store.set(
            &format!("{CHALLENGE_KEY_PREFIX}{token}"),
            seed.clone(),
            Duration::from_secs(CHALLENGE_TTL_SECS),
        );
        info!(node_id = %node_id, "issued benchmark challenge");

        Challenge {
            challenge_token: token,
            seed,
            matrix_size: BENCHMARK_MATRIX_SIZE,
        }
    }

    /// Verify a proof submission and upsert the node's benchmark state.
    ///
    /// The multiplier is the only settlement input written here; settlement
    /// itself never touches it.
    pub fn verify_proof(
        &self,
        node_id: &NodeId,
        challenge_token: &str,
        proof_hash: &str,
        duration: f64,
        device_name: &str,
        now: Timestamp,
    ) -> Result<Verification, CoordinatorError> {
        let challenge_key = format!("{CHALLENGE_KEY_PREFIX}{challenge_token}");
        self.store
            .get(&challenge_key)
            .ok_or(CoordinatorError::ChallengeExpired)?;

        if proof_hash.len() != 64 || !proof_hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CoordinatorError::BadProofFormat);
        }

        let multiplier = calculate_multiplier(duration);

        let node = match self.db.get_node(node_id)? {
            Some(mut node) => {
                node.multiplier = multiplier;
                node.hardware_model = device_name.to_string();
                node.benchmark_score = duration;
                node.last_benchmark = now;
                node
            }
            None => {
                let owner = self.ensure_system_owner(now)?;
                Node::register(
                    node_id.clone(),
                    owner,
                    multiplier,
                    duration,
                    device_name.to_string(),
                    now,
                )
            }
        };
        self.db.put_node(&node)?;

        self.store.delete(&challenge_key);

        let tier = tier_for(multiplier);
        info!(node_id = %node_id, duration, multiplier, tier, "hardware proof verified");
        Ok(Verification { multiplier, tier })
    }

    /// Nodes that verify before any user claims them belong to the system
    /// account, which earns no starter grant.
    fn ensure_system_owner(&self, now: Timestamp) -> Result<PublicKey, CoordinatorError> {
        let owner = PublicKey::from(SYSTEM_OWNER_PUBLIC_KEY);
        if !self.db.user_exists(&owner) {
            self.db.put_user(&User::new(owner.clone(), 0, now))?;
        }
        Ok(owner)
    }
}

/// Convert benchmark wall-clock into a credit multiplier.
///
/// Baseline: the reference GPU (RTX 3060) takes ~35 s → 1.0×. Capped at 20×;
/// rounded to two decimals; non-positive durations earn nothing.
pub fn calculate_multiplier(duration: f64) -> f64 {
    if duration <= 0.0 {
        return 0.0;
    }
    let multiplier = (BENCHMARK_BASELINE_SECS / duration).min(MULTIPLIER_CAP);
    (multiplier * 100.0).round() / 100.0
}

fn tier_for(multiplier: f64) -> &'static str {
    if multiplier > HIGH_PERFORMANCE_THRESHOLD {
        "High Performance"
    } else {
        "Standard"
    }
}

fn random_hex128() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prover(name: &str) -> HardwareProver {
        let dir = std::env::temp_dir().join(format!("troop_proof_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        HardwareProver::new(
            Arc::new(EphemeralStore::new()),
            Arc::new(LedgerDb::open(&dir).expect("open db")),
        )
    }

    const GOOD_HASH: &str =
        "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    #[test]
    fn challenge_tokens_and_seeds_are_distinct_hex() {
        let prover = prover("tokens");
        let ch = prover.issue_challenge(&"n1".into());
        assert_eq!(ch.challenge_token.len(), 32);
        assert_eq!(ch.seed.len(), 32);
        assert_ne!(ch.challenge_token, ch.seed);
        assert_eq!(ch.matrix_size, 4096);
    }

    #[test]
    fn baseline_duration_verifies_at_one_x() {
        let prover = prover("baseline");
        let ch = prover.issue_challenge(&"n1".into());

        let v = prover
            .verify_proof(&"n1".into(), &ch.challenge_token, GOOD_HASH, 35.0, "RTX 3060", 1_000)
            .expect("verify");
        assert_eq!(v.multiplier, 1.0);
        assert_eq!(v.tier, "Standard");

        let node = prover.db.get_node(&"n1".into()).unwrap().expect("node row");
        assert_eq!(node.multiplier, 1.0);
        assert_eq!(node.benchmark_score, 35.0);
        assert_eq!(node.hardware_model, "RTX 3060");
        assert_eq!(node.owner_public_key.as_str(), SYSTEM_OWNER_PUBLIC_KEY);
        // System owner exists with an empty balance.
        let system = prover.db.get_user(&SYSTEM_OWNER_PUBLIC_KEY.into()).unwrap().unwrap();
        assert_eq!(system.balance_seconds, 0);
    }

    #[test]
    fn fast_gpu_lands_in_high_performance_tier() {
        let prover = prover("fast");
        let ch = prover.issue_challenge(&"n1".into());
        let v = prover
            .verify_proof(&"n1".into(), &ch.challenge_token, GOOD_HASH, 7.0, "RTX 4090", 1_000)
            .expect("verify");
        assert_eq!(v.multiplier, 5.0);
        assert_eq!(v.tier, "High Performance");
    }

    #[test]
    fn challenge_is_single_use() {
        let prover = prover("single_use");
        let ch = prover.issue_challenge(&"n1".into());
        prover
            .verify_proof(&"n1".into(), &ch.challenge_token, GOOD_HASH, 35.0, "RTX 3060", 1_000)
            .expect("first verify");
        let err = prover
            .verify_proof(&"n1".into(), &ch.challenge_token, GOOD_HASH, 35.0, "RTX 3060", 1_000)
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::ChallengeExpired));
    }

    #[test]
    fn unknown_token_is_expired() {
        let prover = prover("unknown");
        let err = prover
            .verify_proof(&"n1".into(), "deadbeef", GOOD_HASH, 35.0, "RTX 3060", 1_000)
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::ChallengeExpired));
    }

    #[test]
    fn malformed_proof_hash_is_rejected_and_challenge_survives() {
        let prover = prover("bad_hash");
        let ch = prover.issue_challenge(&"n1".into());

        let right_length_not_hex = format!("{}zz", &GOOD_HASH[..62]);
        for bad in ["short", right_length_not_hex.as_str()] {
            let err = prover
                .verify_proof(&"n1".into(), &ch.challenge_token, bad, 35.0, "RTX 3060", 1_000)
                .unwrap_err();
            assert!(matches!(err, CoordinatorError::BadProofFormat));
        }

        // The challenge was not consumed by the failed attempts.
        prover
            .verify_proof(&"n1".into(), &ch.challenge_token, GOOD_HASH, 35.0, "RTX 3060", 1_000)
            .expect("verify after bad attempts");
    }

    #[test]
    fn reverification_updates_benchmark_but_keeps_identity() {
        let prover = prover("reverify");
        let ch = prover.issue_challenge(&"n1".into());
        prover
            .verify_proof(&"n1".into(), &ch.challenge_token, GOOD_HASH, 35.0, "RTX 3060", 1_000)
            .unwrap();

        // Claim the node for a user, then re-benchmark.
        let mut node = prover.db.get_node(&"n1".into()).unwrap().unwrap();
        node.owner_public_key = "alice".into();
        node.trust_score = 0.5;
        node.total_jobs_completed = 7;
        prover.db.put_node(&node).unwrap();

        let ch = prover.issue_challenge(&"n1".into());
        let v = prover
            .verify_proof(&"n1".into(), &ch.challenge_token, GOOD_HASH, 10.0, "RTX 4080", 2_000)
            .unwrap();
        assert_eq!(v.multiplier, 3.5);

        let node = prover.db.get_node(&"n1".into()).unwrap().unwrap();
        assert_eq!(node.owner_public_key.as_str(), "alice");
        assert_eq!(node.trust_score, 0.5);
        assert_eq!(node.total_jobs_completed, 7);
        assert_eq!(node.hardware_model, "RTX 4080");
        assert_eq!(node.last_benchmark, 2_000);
    }

    #[test]
    fn multiplier_is_bounded_and_rounded() {
        assert_eq!(calculate_multiplier(35.0), 1.0);
        assert_eq!(calculate_multiplier(7.0), 5.0);
        assert_eq!(calculate_multiplier(0.1), 20.0); // capped
        assert_eq!(calculate_multiplier(1.75), 20.0);
        assert_eq!(calculate_multiplier(1.76), 19.89);
        assert_eq!(calculate_multiplier(0.0), 0.0);
        assert_eq!(calculate_multiplier(-3.0), 0.0);
        assert_eq!(calculate_multiplier(10_000.0), 0.0); // rounds to zero
        assert_eq!(calculate_multiplier(3.0), 11.67);

        for duration in [0.01, 0.5, 3.3, 35.0, 350.0] {
            let m = calculate_multiplier(duration);
            assert!((0.0..=20.0).contains(&m));
        }
    }
}
