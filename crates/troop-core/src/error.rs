use thiserror::Error;

use crate::types::{JobId, NodeId};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    // ── Credit errors ────────────────────────────────────────────────────────
    #[error("insufficient credits: balance {balance}s, required {required}s")]
    InsufficientCredits { balance: i64, required: i64 },

    #[error("requester not found: {0}")]
    UnknownRequester(String),

    // ── Settlement errors ────────────────────────────────────────────────────
    #[error("invalid receipt signature")]
    InvalidReceipt,

    #[error("worker node not found: {0}")]
    UnknownNode(NodeId),

    #[error("job already settled: {0}")]
    DuplicateSettlement(JobId),

    // ── Proof-of-hardware errors ─────────────────────────────────────────────
    #[error("challenge expired or invalid")]
    ChallengeExpired,

    #[error("invalid proof hash format")]
    BadProofFormat,

    // ── Placement errors ─────────────────────────────────────────────────────
    #[error("no idle nodes found for model: {0}")]
    NoCapableIdleWorker(String),

    // ── Ticket errors ────────────────────────────────────────────────────────
    #[error("ticket rejected")]
    InvalidTicket,

    // ── Rate limiting ────────────────────────────────────────────────────────
    #[error("rate limit exceeded: {limit} per {window_secs}s")]
    RateLimited { limit: u64, window_secs: u64 },

    // ── Admin ────────────────────────────────────────────────────────────────
    #[error("invalid admin credentials")]
    InvalidAdminCredentials,

    // ── Key material ─────────────────────────────────────────────────────────
    #[error("key material error: {0}")]
    KeyMaterial(String),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    // ── Configuration ────────────────────────────────────────────────────────
    #[error("configuration error: {0}")]
    Config(String),
}
