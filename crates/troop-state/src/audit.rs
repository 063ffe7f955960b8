//! Dual-write audit sink.
//!
//! Every security-relevant event goes to an append-only JSON-lines file and
//! to an `audit_logs` row. Neither write may block the primary operation: a
//! file failure is swallowed after a log line, a ledger failure likewise.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tracing::warn;

use troop_core::error::CoordinatorError;
use troop_core::ledger::{AuditEvent, AuditRecord};
use troop_core::types::{JobId, NodeId, PublicKey};

use crate::db::LedgerDb;

pub struct AuditSink {
    db: Arc<LedgerDb>,
    /// Shared append handle; line-oriented writes keep entries atomic.
    file: Mutex<File>,
}

impl AuditSink {
    pub fn open<P: AsRef<Path>>(path: P, db: Arc<LedgerDb>) -> Result<Self, CoordinatorError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CoordinatorError::Storage(e.to_string()))?;
        Ok(Self {
            db,
            file: Mutex::new(file),
        })
    }

    // ── Event constructors ───────────────────────────────────────────────────

    pub fn authorization(
        &self,
        requester: &PublicKey,
        model: &str,
        node_id: Option<&NodeId>,
        ip: &str,
        success: bool,
        reason: Option<&str>,
    ) {
        self.record(
            AuditEvent::Authorization,
            Some(requester.as_str()),
            Some(ip),
            json!({
                "model": model,
                "node_id": node_id.map(|n| n.as_str().to_string()),
                "success": success,
                "reason": reason,
            }),
        );
    }

    pub fn transaction(
        &self,
        job_id: &JobId,
        requester: &PublicKey,
        node_id: &NodeId,
        duration: i64,
        credits: i64,
        ip: &str,
    ) {
        self.record(
            AuditEvent::Transaction,
            Some(requester.as_str()),
            Some(ip),
            json!({
                "job_id": job_id.as_str(),
                "worker_id": node_id.as_str(),
                "duration": duration,
                "credits": credits,
            }),
        );
    }

    pub fn rate_limit(&self, ip: &str, endpoint: &str, limit: u64, window_secs: u64) {
        self.record(
            AuditEvent::RateLimit,
            None,
            Some(ip),
            json!({
                "endpoint": endpoint,
                "limit": limit,
                "window": window_secs,
            }),
        );
    }

    pub fn security(&self, kind: &str, details: serde_json::Value, ip: Option<&str>) {
        self.record(
            AuditEvent::Security,
            None,
            ip,
            json!({
                "kind": kind,
                "details": details,
            }),
        );
    }

    /// Read back audit rows for the admin endpoint.
    pub fn query(
        &self,
        limit: usize,
        offset: usize,
        event_type: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Vec<AuditRecord>, CoordinatorError> {
        self.db.query_audit(limit, offset, event_type, user_id)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn record(
        &self,
        event_type: AuditEvent,
        user_id: Option<&str>,
        ip: Option<&str>,
        details: serde_json::Value,
    ) {
        let seq = match self.db.next_seq() {
            Ok(seq) => seq,
            Err(e) => {
                warn!(error = %e, "audit sequence allocation failed");
                return;
            }
        };
        let record = AuditRecord {
            seq,
            timestamp: chrono::Utc::now().timestamp(),
            event_type,
            user_id: user_id.map(str::to_string),
            ip_address: ip.map(str::to_string),
            details,
        };

        self.write_line(&record);

        if let Err(e) = self.db.append_audit(&record) {
            warn!(error = %e, event = event_type.as_str(), "audit row write failed");
        }
    }

    fn write_line(&self, record: &AuditRecord) {
        let line = json!({
            "timestamp": record.timestamp,
            "event": record.event_type.as_str(),
            "user_id": record.user_id,
            "ip_address": record.ip_address,
            "details": record.details,
        });
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(file, "{line}") {
            warn!(error = %e, "audit file write failed");
        }
    }
}
