//! troop-rpc
//!
//! HTTP API for the Troop coordinator.
//!
//! Endpoints:
//!   GET  /health                        — liveness
//!   GET  /public-key                    — ticket verification key (PEM)
//!   POST /heartbeat                     — worker liveness report
//!   GET  /peers?model=                  — idle workers, capability-filtered
//!   POST /hardware/challenge            — issue a benchmark challenge
//!   POST /hardware/verify               — record a proof-of-hardware result
//!   POST /authorize                     — reserve credits and mint a ticket
//!   POST /transactions/submit           — settle a signed job receipt
//!   GET  /users/{public_key}/balance    — credit balance
//!   GET  /users/{public_key}/transactions — ledger history
//!   GET  /admin/audit                   — audit log (HTTP Basic)
//!   GET  /v1/models                     — OpenAI-style model list
//!
//! The middleware chain is part of the contract: timeout → request tracing →
//! rate limiting → handler. This crate is the only layer that translates
//! typed coordinator errors into HTTP statuses.

pub mod api;
pub mod auth;
pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use rate_limit::RateLimiter;
pub use server::{build_router, parse_allowed_origins, serve, AppState, CorsOrigins};
