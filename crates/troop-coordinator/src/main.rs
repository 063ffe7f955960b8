//! troop-coordinator — the Monkey Troop coordinator binary.
//!
//! Startup sequence:
//!   1. Load configuration (flags with env fallbacks); refuse bad CORS or a
//!      missing receipt secret before touching any state
//!   2. Ensure the RSA ticket-signing keypair exists
//!   3. Open the durable ledger; build the ephemeral store
//!   4. Wire registry, prover, credit engine, audit sink, rate limiter
//!   5. Serve the HTTP API until ctrl-c

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use troop_credit::CreditEngine;
use troop_crypto::KeyManager;
use troop_fleet::{FleetRegistry, HardwareProver};
use troop_rpc::{parse_allowed_origins, serve, AppState, RateLimiter};
use troop_state::{AuditSink, EphemeralStore, LedgerDb};

#[derive(Parser, Debug)]
#[command(
    name = "troop-coordinator",
    version,
    about = "Monkey Troop coordinator — discovery, verification and settlement for distributed AI compute"
)]
struct Args {
    /// Directory for the durable ledger database.
    #[arg(long, env = "TROOP_DATA_DIR", default_value = "~/.troop/data")]
    data_dir: PathBuf,

    /// Directory holding the RSA ticket-signing keypair.
    #[arg(long, env = "TROOP_KEYS_DIR", default_value = "~/.troop/keys")]
    keys_dir: PathBuf,

    /// Append-only audit log file.
    #[arg(long, env = "TROOP_AUDIT_LOG", default_value = "~/.troop/logs/audit.log")]
    audit_log: PathBuf,

    /// HTTP listen address.
    #[arg(long, env = "TROOP_LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    listen_addr: SocketAddr,

    /// HMAC secret shared with workers for job receipts. Required.
    #[arg(long, env = "RECEIPT_SECRET", hide_env_values = true)]
    receipt_secret: String,

    /// Password for /admin endpoints (HTTP Basic).
    #[arg(
        long,
        env = "ADMIN_PASSWORD",
        hide_env_values = true,
        default_value = "change-me-in-production"
    )]
    admin_password: String,

    /// Comma-separated CORS allow-list, or "*".
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = "*")]
    allowed_origins: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,troop=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("Troop coordinator starting");

    // ── Configuration checks before any state is touched ──────────────────────
    if args.receipt_secret.trim().is_empty() {
        anyhow::bail!("RECEIPT_SECRET must not be empty; workers sign job receipts with it");
    }
    let origins =
        parse_allowed_origins(&args.allowed_origins).context("parsing ALLOWED_ORIGINS")?;

    // ── Key material ──────────────────────────────────────────────────────────
    let keys_dir = expand_tilde(&args.keys_dir);
    let keys =
        Arc::new(KeyManager::ensure(&keys_dir).context("ensuring ticket signing keypair")?);

    // ── Stores ────────────────────────────────────────────────────────────────
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(LedgerDb::open(&data_dir).context("opening ledger database")?);
    let store = Arc::new(EphemeralStore::new());

    let audit = Arc::new(
        AuditSink::open(expand_tilde(&args.audit_log), Arc::clone(&db))
            .context("opening audit log")?,
    );

    // ── Wiring ────────────────────────────────────────────────────────────────
    let state = AppState {
        registry: Arc::new(FleetRegistry::new(Arc::clone(&store))),
        prover: Arc::new(HardwareProver::new(Arc::clone(&store), Arc::clone(&db))),
        credits: Arc::new(CreditEngine::new(
            Arc::clone(&db),
            args.receipt_secret.clone(),
        )),
        keys,
        audit,
        limiter: Arc::new(RateLimiter::new(store)),
        admin_password: Arc::new(args.admin_password.clone()),
    };

    info!("coordinator ready");
    serve(args.listen_addr, state, &origins).await
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
