//! troop-credit
//!
//! The credit engine: user lifecycle, reservations, refunds, and settlement
//! of signed job receipts into the durable ledger.

pub mod engine;

pub use engine::{CreditEngine, Settlement};
