//! troop-fleet
//!
//! The live view of the worker fleet and admission into it:
//!   registry  — heartbeat absorption and capability-filtered queries
//!   proof     — proof-of-hardware challenge/verify and multiplier assignment
//!   placement — worker selection for an authorization request

pub mod placement;
pub mod proof;
pub mod registry;

pub use placement::select_worker;
pub use proof::{calculate_multiplier, Challenge, HardwareProver, Verification};
pub use registry::FleetRegistry;
