//! Append-only ledger rows and audit records.

use serde::{Deserialize, Serialize};

use crate::types::{Credits, JobId, NodeId, PublicKey, Timestamp};

// ── EntryMeta ────────────────────────────────────────────────────────────────

/// Tagged classification of a ledger row, serialized into the row's JSON
/// `meta` column as `{"type": "..."}`.
///
/// `from_user = None` rows are system-origin credit creation (grants and
/// refunds) and are excluded from conservation accounting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryMeta {
    StarterGrant,
    Refund,
    JobCompletion { multiplier: f64 },
}

impl EntryMeta {
    pub fn kind(&self) -> &'static str {
        match self {
            EntryMeta::StarterGrant => "starter_grant",
            EntryMeta::Refund => "refund",
            EntryMeta::JobCompletion { .. } => "job_completion",
        }
    }
}

// ── LedgerEntry ──────────────────────────────────────────────────────────────

/// One committed credit movement. Append-only: no updates, no deletes.
///
/// For every settled job there is exactly one `JobCompletion` row with that
/// job id; `starter_grant` is the only job id that repeats.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Synthetic sequence assigned at commit time.
    pub seq: u64,
    /// None for system grants and refunds.
    pub from_user: Option<PublicKey>,
    pub to_user: Option<PublicKey>,
    pub duration_seconds: i64,
    pub credits_transferred: Credits,
    pub job_id: JobId,
    pub node_id: Option<NodeId>,
    pub timestamp: Timestamp,
    pub meta: EntryMeta,
}

// ── Audit records ────────────────────────────────────────────────────────────

/// Classification of a security-relevant event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    Authorization,
    Transaction,
    RateLimit,
    Security,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::Authorization => "authorization",
            AuditEvent::Transaction => "transaction",
            AuditEvent::RateLimit => "rate_limit",
            AuditEvent::Security => "security",
        }
    }
}

/// One audit row, dual-written to the append-only file and the ledger.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditRecord {
    pub seq: u64,
    pub timestamp: Timestamp,
    pub event_type: AuditEvent,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub details: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_meta_json_is_tagged() {
        let meta = EntryMeta::JobCompletion { multiplier: 5.0 };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "job_completion");
        assert_eq!(json["multiplier"], 5.0);

        let grant: EntryMeta = serde_json::from_str(r#"{"type":"starter_grant"}"#).unwrap();
        assert_eq!(grant, EntryMeta::StarterGrant);
    }
}
