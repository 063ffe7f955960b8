//! troop-state
//!
//! Typed storage clients for the coordinator:
//!   ephemeral — TTL'd key-value store for heartbeats, challenges, counters
//!   db        — durable ledger tables (users, nodes, transactions, audit)
//!   audit     — dual-write audit sink (append-only file + ledger rows)
//!
//! No business logic lives here; these are the injected capabilities the
//! fleet, credit, and rpc crates are built on.

pub mod audit;
pub mod db;
pub mod ephemeral;

pub use audit::AuditSink;
pub use db::LedgerDb;
pub use ephemeral::EphemeralStore;
