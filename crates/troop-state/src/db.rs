use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;

use troop_core::error::CoordinatorError;
use troop_core::ledger::{AuditRecord, LedgerEntry};
use troop_core::types::{JobId, NodeId, PublicKey};
use troop_core::{Node, User};

/// Durable ledger database backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   users        — public key bytes → json(User)
///   nodes        — node id bytes    → json(Node)
///   transactions — seq u64 be bytes → json(LedgerEntry), append-only
///   settled_jobs — job id bytes     → seq u64 be bytes (settlement uniqueness)
///   audit_logs   — seq u64 be bytes → json(AuditRecord), append-only
///
/// Multi-row commits go through sled transactions so they land all-or-nothing;
/// callers serialize competing credit mutations above this layer.
pub struct LedgerDb {
    db: sled::Db,
    users: sled::Tree,
    nodes: sled::Tree,
    transactions: sled::Tree,
    settled_jobs: sled::Tree,
    audit_logs: sled::Tree,
}

fn storage_err(e: impl std::fmt::Display) -> CoordinatorError {
    CoordinatorError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CoordinatorError> {
    serde_json::to_vec(value).map_err(|e| CoordinatorError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CoordinatorError> {
    serde_json::from_slice(bytes).map_err(|e| CoordinatorError::Serialization(e.to_string()))
}

impl LedgerDb {
    /// Open or create the ledger database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CoordinatorError> {
        let db = sled::open(path).map_err(storage_err)?;
        let users        = db.open_tree("users").map_err(storage_err)?;
        let nodes        = db.open_tree("nodes").map_err(storage_err)?;
        let transactions = db.open_tree("transactions").map_err(storage_err)?;
        let settled_jobs = db.open_tree("settled_jobs").map_err(storage_err)?;
        let audit_logs   = db.open_tree("audit_logs").map_err(storage_err)?;
        Ok(Self { db, users, nodes, transactions, settled_jobs, audit_logs })
    }

    /// Next value of the shared monotonic sequence (ledger and audit rows).
    pub fn next_seq(&self) -> Result<u64, CoordinatorError> {
        self.db.generate_id().map_err(storage_err)
    }

    // ── Users ────────────────────────────────────────────────────────────────

    pub fn get_user(&self, pk: &PublicKey) -> Result<Option<User>, CoordinatorError> {
        match self.users.get(pk.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_user(&self, user: &User) -> Result<(), CoordinatorError> {
        self.users
            .insert(user.public_key.as_bytes(), encode(user)?)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn user_exists(&self, pk: &PublicKey) -> bool {
        self.users.contains_key(pk.as_bytes()).unwrap_or(false)
    }

    // ── Nodes ────────────────────────────────────────────────────────────────

    pub fn get_node(&self, id: &NodeId) -> Result<Option<Node>, CoordinatorError> {
        match self.nodes.get(id.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_node(&self, node: &Node) -> Result<(), CoordinatorError> {
        self.nodes
            .insert(node.node_id.as_bytes(), encode(node)?)
            .map_err(storage_err)?;
        Ok(())
    }

    // ── Ledger rows ──────────────────────────────────────────────────────────

    pub fn append_entry(&self, entry: &LedgerEntry) -> Result<(), CoordinatorError> {
        self.transactions
            .insert(entry.seq.to_be_bytes(), encode(entry)?)
            .map_err(storage_err)?;
        Ok(())
    }

    /// Rows where `pk` is either party, newest first.
    pub fn entries_for_user(
        &self,
        pk: &PublicKey,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, CoordinatorError> {
        let mut result = Vec::new();
        for item in self.transactions.iter().rev() {
            let (_, bytes) = item.map_err(storage_err)?;
            let entry: LedgerEntry = decode(&bytes)?;
            if entry.from_user.as_ref() == Some(pk) || entry.to_user.as_ref() == Some(pk) {
                result.push(entry);
                if result.len() >= limit {
                    break;
                }
            }
        }
        Ok(result)
    }

    pub fn job_settled(&self, job_id: &JobId) -> bool {
        self.settled_jobs.contains_key(job_id.as_bytes()).unwrap_or(false)
    }

    // ── Transactional commits ────────────────────────────────────────────────

    /// Insert a new user and their starter-grant row atomically.
    pub fn commit_user_with_grant(
        &self,
        user: &User,
        grant: &LedgerEntry,
    ) -> Result<(), CoordinatorError> {
        let user_bytes = encode(user)?;
        let grant_bytes = encode(grant)?;
        let grant_key = grant.seq.to_be_bytes();

        (&self.users, &self.transactions)
            .transaction(|(users, transactions)| {
                users.insert(user.public_key.as_bytes(), user_bytes.as_slice())?;
                transactions.insert(&grant_key, grant_bytes.as_slice())?;
                Ok::<(), ConflictableTransactionError<CoordinatorError>>(())
            })
            .map_err(unwrap_tx_err)
    }

    /// Credit a user and append the refund row atomically.
    pub fn commit_refund(
        &self,
        user: &User,
        entry: &LedgerEntry,
    ) -> Result<(), CoordinatorError> {
        let user_bytes = encode(user)?;
        let entry_bytes = encode(entry)?;
        let entry_key = entry.seq.to_be_bytes();

        (&self.users, &self.transactions)
            .transaction(|(users, transactions)| {
                users.insert(user.public_key.as_bytes(), user_bytes.as_slice())?;
                transactions.insert(&entry_key, entry_bytes.as_slice())?;
                Ok::<(), ConflictableTransactionError<CoordinatorError>>(())
            })
            .map_err(unwrap_tx_err)
    }

    /// Commit a settlement: the worker-owner's new balance, the node's
    /// updated stats, the `job_completion` row, and the settlement-uniqueness
    /// marker, all-or-nothing. A job id that already settled aborts the whole
    /// transaction with `DuplicateSettlement`.
    pub fn commit_settlement(
        &self,
        owner: &User,
        node: &Node,
        entry: &LedgerEntry,
    ) -> Result<(), CoordinatorError> {
        let owner_bytes = encode(owner)?;
        let node_bytes = encode(node)?;
        let entry_bytes = encode(entry)?;
        let entry_key = entry.seq.to_be_bytes();
        let job_id = entry.job_id.clone();

        (&self.users, &self.nodes, &self.transactions, &self.settled_jobs)
            .transaction(|(users, nodes, transactions, settled)| {
                if settled.get(job_id.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        CoordinatorError::DuplicateSettlement(job_id.clone()),
                    ));
                }
                users.insert(owner.public_key.as_bytes(), owner_bytes.as_slice())?;
                nodes.insert(node.node_id.as_bytes(), node_bytes.as_slice())?;
                transactions.insert(&entry_key, entry_bytes.as_slice())?;
                settled.insert(job_id.as_bytes(), &entry_key[..])?;
                Ok(())
            })
            .map_err(unwrap_tx_err)
    }

    // ── Audit rows ───────────────────────────────────────────────────────────

    pub fn append_audit(&self, record: &AuditRecord) -> Result<(), CoordinatorError> {
        self.audit_logs
            .insert(record.seq.to_be_bytes(), encode(record)?)
            .map_err(storage_err)?;
        Ok(())
    }

    /// Audit rows newest first, with optional event-type and user filters.
    pub fn query_audit(
        &self,
        limit: usize,
        offset: usize,
        event_type: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Vec<AuditRecord>, CoordinatorError> {
        let mut matched = 0usize;
        let mut result = Vec::new();
        for item in self.audit_logs.iter().rev() {
            let (_, bytes) = item.map_err(storage_err)?;
            let record: AuditRecord = decode(&bytes)?;
            if event_type.is_some_and(|et| record.event_type.as_str() != et) {
                continue;
            }
            if user_id.is_some_and(|uid| record.user_id.as_deref() != Some(uid)) {
                continue;
            }
            matched += 1;
            if matched <= offset {
                continue;
            }
            result.push(record);
            if result.len() >= limit {
                break;
            }
        }
        Ok(result)
    }
}

fn unwrap_tx_err(err: TransactionError<CoordinatorError>) -> CoordinatorError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => storage_err(e),
    }
}
