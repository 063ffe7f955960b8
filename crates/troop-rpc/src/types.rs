use serde::{Deserialize, Serialize};

use troop_core::fleet::Heartbeat;
use troop_core::ledger::{AuditRecord, LedgerEntry};

// ── Health / keys ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub public_key: String,
}

// ── Fleet ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatAck {
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeersQuery {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeersResponse {
    pub count: usize,
    pub nodes: Vec<Heartbeat>,
}

// ── Proof-of-hardware ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRequest {
    pub node_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub challenge_token: String,
    pub seed: String,
    pub matrix_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub node_id: String,
    pub challenge_token: String,
    pub proof_hash: String,
    pub duration: f64,
    pub device_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub status: String,
    pub assigned_multiplier: f64,
    pub tier: String,
}

// ── Authorization ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub model: String,
    pub requester: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    /// Mesh address of the selected worker.
    pub target_ip: String,
    /// RS256 ticket the client presents to the worker.
    pub token: String,
    /// Seconds reserved from the requester's balance.
    pub estimated_cost: i64,
}

// ── Settlement ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReceiptRequest {
    pub job_id: String,
    pub requester_public_key: String,
    pub worker_node_id: String,
    pub duration_seconds: i64,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementResponse {
    pub status: String,
    pub credits_transferred: i64,
    pub requester_balance: i64,
    pub worker_balance: i64,
}

// ── Users ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub public_key: String,
    pub balance_seconds: i64,
    pub balance_hours: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Flattened ledger row for history responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub id: u64,
    pub from_user: Option<String>,
    pub to_user: Option<String>,
    pub credits: i64,
    pub duration: i64,
    pub job_id: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<LedgerEntry> for TransactionSummary {
    fn from(entry: LedgerEntry) -> Self {
        let kind = entry.meta.kind().to_string();
        Self {
            id: entry.seq,
            from_user: entry.from_user.map(|pk| pk.0),
            to_user: entry.to_user.map(|pk| pk.0),
            credits: entry.credits_transferred,
            duration: entry.duration_seconds,
            job_id: entry.job_id.0,
            timestamp: entry.timestamp,
            kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<TransactionSummary>,
}

// ── Admin audit ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub event_type: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditLogsResponse {
    pub logs: Vec<AuditRecord>,
    pub count: usize,
    pub limit: usize,
    pub offset: usize,
}

// ── OpenAI compatibility ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: String,
    pub owned_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelEntry>,
}
