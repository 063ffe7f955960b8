//! troop-crypto
//!
//! Key material and signatures for the coordinator:
//!   keys    — RSA-2048 ticket-signing keypair, generated once and persisted
//!   ticket  — short-lived RS256 authorization tickets (JWT)
//!   receipt — HMAC-SHA256 job receipts shared with workers

pub mod keys;
pub mod receipt;
pub mod ticket;

pub use keys::KeyManager;
pub use receipt::{receipt_signature, verify_receipt};
pub use ticket::TicketClaims;
