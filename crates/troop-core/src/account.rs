//! Durable registry entities: [`User`] accounts and worker [`Node`] records.
//!
//! Both are keyed by external identity (wallet public key, node id) rather
//! than synthetic integers, so lazy creation on either side of a settlement
//! never introduces ordering dependencies.

use serde::{Deserialize, Serialize};

use crate::constants::INITIAL_TRUST_SCORE;
use crate::types::{Credits, NodeId, PublicKey, Timestamp};

// ── User ─────────────────────────────────────────────────────────────────────

/// A user account with a credit balance, lazily created on first
/// authorization or first settlement as counterparty. Never deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub public_key: PublicKey,
    /// Seconds of compute the user may reserve. Non-negative at every
    /// commit boundary.
    pub balance_seconds: Credits,
    pub created_at: Timestamp,
    pub last_active: Timestamp,
}

impl User {
    pub fn new(public_key: PublicKey, balance_seconds: Credits, now: Timestamp) -> Self {
        Self {
            public_key,
            balance_seconds,
            created_at: now,
            last_active: now,
        }
    }
}

// ── Node ─────────────────────────────────────────────────────────────────────

/// A worker node, created or upserted on first successful proof-of-hardware
/// verification and updated on settlement. Never deleted.
///
/// `multiplier` is written only by proof-of-hardware verification; settlement
/// reads it but never writes it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub node_id: NodeId,
    /// The user credited when this node completes jobs. Need not exist at
    /// registration time.
    pub owner_public_key: PublicKey,
    /// Credit multiplier assigned from the benchmark, in [0, 20].
    pub multiplier: f64,
    /// Benchmark wall-clock in seconds (positive once benchmarked).
    pub benchmark_score: f64,
    /// Reputation in [0, 1]; starts low, bumped on each settled job.
    pub trust_score: f64,
    pub total_jobs_completed: u64,
    pub hardware_model: String,
    pub last_benchmark: Timestamp,
    pub last_seen: Timestamp,
    pub created_at: Timestamp,
}

impl Node {
    /// A freshly verified node with its first benchmark result applied.
    pub fn register(
        node_id: NodeId,
        owner_public_key: PublicKey,
        multiplier: f64,
        benchmark_score: f64,
        hardware_model: String,
        now: Timestamp,
    ) -> Self {
        Self {
            node_id,
            owner_public_key,
            multiplier,
            benchmark_score,
            trust_score: INITIAL_TRUST_SCORE,
            total_jobs_completed: 0,
            hardware_model,
            last_benchmark: now,
            last_seen: now,
            created_at: now,
        }
    }
}
