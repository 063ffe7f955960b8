//! Worker selection.
//!
//! Uniform random among idle capable workers. No weighting by multiplier or
//! trust in this version; if placement policy grows, this is where it lives.

use rand::seq::SliceRandom;

use troop_core::error::CoordinatorError;
use troop_core::fleet::Heartbeat;

use crate::registry::FleetRegistry;

/// Pick a worker able to serve `model`, or fail when none are idle.
pub fn select_worker(
    registry: &FleetRegistry,
    model: &str,
) -> Result<Heartbeat, CoordinatorError> {
    let candidates = registry.list_peers(Some(model));
    candidates
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| CoordinatorError::NoCapableIdleWorker(model.to_string()))
}
