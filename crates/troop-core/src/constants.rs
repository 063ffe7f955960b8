//! ─── Troop Coordinator Constants ────────────────────────────────────────────
//!
//! Credits are denominated in seconds of compute on the reference GPU.
//! A node's multiplier converts wall-clock duration into credits earned.

// ── Credits ──────────────────────────────────────────────────────────────────

/// Starter grant for a freshly created user: 1 hour of compute.
pub const STARTER_CREDITS: i64 = 3600;

/// Seconds reserved from the requester's balance at authorization time.
/// Forfeited unless refunded; settlement does not re-debit.
pub const ESTIMATED_JOB_DURATION: i64 = 300;

/// Job id recorded on starter-grant ledger rows. May repeat; it is the only
/// system-origin job id that does.
pub const STARTER_GRANT_JOB_ID: &str = "starter_grant";

/// Owner attached to nodes that verify hardware before any user claims them.
pub const SYSTEM_OWNER_PUBLIC_KEY: &str = "system";

// ── Proof-of-Hardware ────────────────────────────────────────────────────────

/// Benchmark wall-clock on the reference GPU (RTX 3060). The sole tunable in
/// multiplier assignment: multiplier = baseline / duration.
pub const BENCHMARK_BASELINE_SECS: f64 = 35.0;

/// Multiplier ceiling. Durations below baseline/20 are treated as this cap.
pub const MULTIPLIER_CAP: f64 = 20.0;

/// Multipliers above this are reported as the "High Performance" tier.
pub const HIGH_PERFORMANCE_THRESHOLD: f64 = 3.0;

/// Side length of the square matrices the worker multiplies.
pub const BENCHMARK_MATRIX_SIZE: u32 = 4096;

/// Seconds a challenge seed stays redeemable.
pub const CHALLENGE_TTL_SECS: u64 = 60;

/// Trust gained per settled job, saturating at 1.0.
pub const TRUST_SCORE_INCREMENT: f64 = 0.01;

/// Trust assigned to a node on first verification.
pub const INITIAL_TRUST_SCORE: f64 = 0.0;

// ── Fleet ────────────────────────────────────────────────────────────────────

/// Seconds a heartbeat keeps a node in the live set. Workers beat every 10 s;
/// a crashed worker is invisible until this elapses.
pub const HEARTBEAT_TTL_SECS: u64 = 15;

// ── Tickets ──────────────────────────────────────────────────────────────────

/// Ticket lifetime: 5 minutes from mint.
pub const TICKET_LIFETIME_SECS: i64 = 300;

/// Audience claim checked by workers when verifying tickets.
pub const TICKET_AUDIENCE: &str = "troop-worker";

/// Tier recorded in the ticket's `project` claim.
pub const TICKET_DEFAULT_PROJECT: &str = "free-tier";

// ── Rate limits ──────────────────────────────────────────────────────────────

/// Fixed-window size for all rate-limit counters.
pub const RATE_WINDOW_SECS: u64 = 3600;

/// Heartbeat / peers / models requests per hour per client IP.
pub const DISCOVERY_LIMIT: u64 = 100;

/// Authorization requests per hour per client IP.
pub const INFERENCE_LIMIT: u64 = 20;

// ── Timeouts ─────────────────────────────────────────────────────────────────

/// Deadline for read-mostly endpoints (health, keys, discovery, balances).
pub const FAST_TIMEOUT_SECS: u64 = 5;

/// Deadline for endpoints that touch the ledger or mint tickets. Also the
/// default for unmatched paths.
pub const SLOW_TIMEOUT_SECS: u64 = 30;

// ── Admin ────────────────────────────────────────────────────────────────────

/// Hard cap on rows returned by the audit query endpoint.
pub const AUDIT_QUERY_MAX_LIMIT: usize = 1000;
