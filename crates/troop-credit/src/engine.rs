use std::sync::{Arc, Mutex, MutexGuard};

use tracing::info;

use troop_core::constants::{STARTER_CREDITS, STARTER_GRANT_JOB_ID, TRUST_SCORE_INCREMENT};
use troop_core::error::CoordinatorError;
use troop_core::ledger::{EntryMeta, LedgerEntry};
use troop_core::types::{Credits, JobId, NodeId, PublicKey, Timestamp};
use troop_core::User;
use troop_crypto::receipt::verify_receipt;
use troop_state::LedgerDb;

/// Result of a settled job receipt.
#[derive(Clone, Debug)]
pub struct Settlement {
    pub credits_transferred: Credits,
    pub requester_balance: Credits,
    pub worker_balance: Credits,
}

/// The credit engine.
///
/// All balance mutations are serialized behind `write_lock` (the row-lock
/// equivalent for the embedded store) and committed through multi-tree
/// transactions, so a reservation racing a settlement can never leave a
/// balance negative or half-applied.
pub struct CreditEngine {
    pub db: Arc<LedgerDb>,
    receipt_secret: String,
    write_lock: Mutex<()>,
}

impl CreditEngine {
    pub fn new(db: Arc<LedgerDb>, receipt_secret: String) -> Self {
        Self {
            db,
            receipt_secret,
            write_lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ── User lifecycle ───────────────────────────────────────────────────────

    /// Create `pk` with the starter grant if absent; return the user either
    /// way. The user row and its `starter_grant` ledger row commit together,
    /// and the serialization lock makes concurrent calls produce exactly one
    /// of each.
    pub fn ensure_user(&self, pk: &PublicKey, now: Timestamp) -> Result<User, CoordinatorError> {
        let _guard = self.lock();
        self.ensure_user_locked(pk, now)
    }

    fn ensure_user_locked(&self, pk: &PublicKey, now: Timestamp) -> Result<User, CoordinatorError> {
        if let Some(user) = self.db.get_user(pk)? {
            return Ok(user);
        }

        let user = User::new(pk.clone(), STARTER_CREDITS, now);
        let grant = LedgerEntry {
            seq: self.db.next_seq()?,
            from_user: None,
            to_user: Some(pk.clone()),
            duration_seconds: 0,
            credits_transferred: STARTER_CREDITS,
            job_id: JobId::from(STARTER_GRANT_JOB_ID),
            node_id: None,
            timestamp: now,
            meta: EntryMeta::StarterGrant,
        };
        self.db.commit_user_with_grant(&user, &grant)?;
        info!(user = %pk, credits = STARTER_CREDITS, "user created with starter grant");
        Ok(user)
    }

    /// Current balance in seconds; 0 for unknown users.
    pub fn balance(&self, pk: &PublicKey) -> Result<Credits, CoordinatorError> {
        Ok(self.db.get_user(pk)?.map(|u| u.balance_seconds).unwrap_or(0))
    }

    pub fn has_balance(&self, pk: &PublicKey, amount: Credits) -> Result<bool, CoordinatorError> {
        Ok(self.balance(pk)? >= amount)
    }

    // ── Reservations ─────────────────────────────────────────────────────────

    /// Pre-debit `amount` from the requester at authorization time.
    /// Settlement will not debit again; the reservation is forfeited unless
    /// refunded.
    pub fn reserve(
        &self,
        pk: &PublicKey,
        amount: Credits,
        now: Timestamp,
    ) -> Result<(), CoordinatorError> {
        let _guard = self.lock();
        let mut user = match self.db.get_user(pk)? {
            Some(user) if user.balance_seconds >= amount => user,
            Some(user) => {
                return Err(CoordinatorError::InsufficientCredits {
                    balance: user.balance_seconds,
                    required: amount,
                })
            }
            None => {
                return Err(CoordinatorError::InsufficientCredits {
                    balance: 0,
                    required: amount,
                })
            }
        };
        user.balance_seconds -= amount;
        user.last_active = now;
        self.db.put_user(&user)
    }

    /// Credit `amount` back (e.g. a job that failed early) and record the
    /// refund as a system-origin ledger row.
    pub fn refund(
        &self,
        pk: &PublicKey,
        amount: Credits,
        job_id: &JobId,
        now: Timestamp,
    ) -> Result<(), CoordinatorError> {
        let _guard = self.lock();
        let mut user = self
            .db
            .get_user(pk)?
            .ok_or_else(|| CoordinatorError::UnknownRequester(pk.to_string()))?;
        user.balance_seconds += amount;

        let entry = LedgerEntry {
            seq: self.db.next_seq()?,
            from_user: None,
            to_user: Some(pk.clone()),
            duration_seconds: 0,
            credits_transferred: amount,
            job_id: job_id.clone(),
            node_id: None,
            timestamp: now,
            meta: EntryMeta::Refund,
        };
        self.db.commit_refund(&user, &entry)
    }

    // ── Settlement ───────────────────────────────────────────────────────────

    /// Apply a signed job receipt: verify the HMAC, credit the worker-owner
    /// by `duration × multiplier`, bump the node's stats, and append the
    /// `job_completion` row. The requester was already debited at
    /// reservation time and is not touched here.
    ///
    /// A `job_id` that has settled before aborts with `DuplicateSettlement`
    /// inside the commit, so a replayed receipt credits nothing.
    pub fn settle(
        &self,
        job_id: &JobId,
        requester_pk: &PublicKey,
        node_id: &NodeId,
        duration_seconds: i64,
        receipt_signature: &str,
        now: Timestamp,
    ) -> Result<Settlement, CoordinatorError> {
        if !verify_receipt(
            &self.receipt_secret,
            job_id,
            node_id,
            duration_seconds,
            receipt_signature,
        ) {
            return Err(CoordinatorError::InvalidReceipt);
        }

        let mut node = self
            .db
            .get_node(node_id)?
            .ok_or_else(|| CoordinatorError::UnknownNode(node_id.clone()))?;

        let credits = (duration_seconds as f64 * node.multiplier).floor() as Credits;

        let requester = self
            .db
            .get_user(requester_pk)?
            .ok_or_else(|| CoordinatorError::UnknownRequester(requester_pk.to_string()))?;

        let _guard = self.lock();

        // Worker owners earn credits before they ever authorize a job, so
        // they are created here with the usual starter grant.
        let mut owner = self.ensure_user_locked(&node.owner_public_key, now)?;
        owner.balance_seconds += credits;

        node.total_jobs_completed += 1;
        node.last_seen = now;
        node.trust_score = (node.trust_score + TRUST_SCORE_INCREMENT).min(1.0);

        let entry = LedgerEntry {
            seq: self.db.next_seq()?,
            from_user: Some(requester_pk.clone()),
            to_user: Some(owner.public_key.clone()),
            duration_seconds,
            credits_transferred: credits,
            job_id: job_id.clone(),
            node_id: Some(node_id.clone()),
            timestamp: now,
            meta: EntryMeta::JobCompletion {
                multiplier: node.multiplier,
            },
        };
        self.db.commit_settlement(&owner, &node, &entry)?;

        info!(job_id = %job_id, credits, worker = %node_id, "job settled");

        let requester_balance = if requester.public_key == owner.public_key {
            owner.balance_seconds
        } else {
            requester.balance_seconds
        };
        Ok(Settlement {
            credits_transferred: credits,
            requester_balance,
            worker_balance: owner.balance_seconds,
        })
    }

    // ── History ──────────────────────────────────────────────────────────────

    /// Ledger rows involving `pk`, newest first.
    pub fn history(
        &self,
        pk: &PublicKey,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, CoordinatorError> {
        self.db.entries_for_user(pk, limit)
    }
}
