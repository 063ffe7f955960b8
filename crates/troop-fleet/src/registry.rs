use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use troop_core::constants::HEARTBEAT_TTL_SECS;
use troop_core::fleet::{Heartbeat, NodeStatus};
use troop_core::error::CoordinatorError;
use troop_state::EphemeralStore;

const NODE_KEY_PREFIX: &str = "node:";

/// The live set of workers, rebuilt continuously from heartbeats.
///
/// Liveness is defined exclusively by ephemeral-store TTL: a crashed worker
/// stays visible until its last heartbeat expires, and the registry never
/// ages entries proactively. Heartbeat payloads are authoritative for status.
pub struct FleetRegistry {
    store: Arc<EphemeralStore>,
}

impl FleetRegistry {
    pub fn new(store: Arc<EphemeralStore>) -> Self {
        Self { store }
    }

    /// Overwrite the entry for this worker, restarting its 15 s TTL.
    /// No validation beyond the payload schema.
    pub fn record_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(), CoordinatorError> {
        self.record_with_ttl(heartbeat, Duration::from_secs(HEARTBEAT_TTL_SECS))
    }

    fn record_with_ttl(&self, heartbeat: &Heartbeat, ttl: Duration) -> Result<(), CoordinatorError> {
        let payload = serde_json::to_string(heartbeat)
            .map_err(|e| CoordinatorError::Serialization(e.to_string()))?;
        self.store
            .set(&format!("{NODE_KEY_PREFIX}{}", heartbeat.node_id), payload, ttl);
        Ok(())
    }

    /// Every live entry regardless of status.
    pub fn live_entries(&self) -> Vec<Heartbeat> {
        let keys = self.store.keys_with_prefix(NODE_KEY_PREFIX);
        self.store
            .mget(&keys)
            .into_iter()
            .flatten()
            .filter_map(|raw| match serde_json::from_str::<Heartbeat>(&raw) {
                Ok(hb) => Some(hb),
                Err(e) => {
                    debug!(error = %e, "skipping undecodable heartbeat entry");
                    None
                }
            })
            .collect()
    }

    /// Live IDLE workers, optionally filtered to those serving `model`.
    pub fn list_peers(&self, model: Option<&str>) -> Vec<Heartbeat> {
        self.live_entries()
            .into_iter()
            .filter(|hb| hb.status == NodeStatus::Idle)
            .filter(|hb| model.is_none_or(|m| hb.models.iter().any(|s| s == m)))
            .collect()
    }

    /// Sorted union of models across all live entries (any status).
    pub fn list_all_models(&self) -> Vec<String> {
        let mut models = BTreeSet::new();
        for hb in self.live_entries() {
            models.extend(hb.models);
        }
        models.into_iter().collect()
    }
}
