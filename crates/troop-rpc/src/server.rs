use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::info;

use troop_core::error::CoordinatorError;
use troop_credit::CreditEngine;
use troop_crypto::KeyManager;
use troop_fleet::{FleetRegistry, HardwareProver};
use troop_state::AuditSink;

use crate::api;
use crate::middleware;
use crate::rate_limit::RateLimiter;

/// Everything a handler can reach. Explicit dependencies, constructed once at
/// process start and cloned per request; nothing global.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<FleetRegistry>,
    pub prover: Arc<HardwareProver>,
    pub credits: Arc<CreditEngine>,
    pub keys: Arc<KeyManager>,
    pub audit: Arc<AuditSink>,
    pub limiter: Arc<RateLimiter>,
    pub admin_password: Arc<String>,
}

// ── CORS configuration ───────────────────────────────────────────────────────

/// Parsed `ALLOWED_ORIGINS` policy.
#[derive(Clone, Debug)]
pub enum CorsOrigins {
    /// `*`: any origin, credentials disabled.
    Any,
    /// Explicit allow-list, credentials enabled.
    List(Vec<HeaderValue>),
}

/// Parse a comma-separated `ALLOWED_ORIGINS` value. Mixing `*` with specific
/// origins is a configuration error, refused at startup.
pub fn parse_allowed_origins(raw: &str) -> Result<CorsOrigins, CoordinatorError> {
    let entries: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if entries.is_empty() {
        return Err(CoordinatorError::Config(
            "ALLOWED_ORIGINS must name at least one origin or be \"*\"".into(),
        ));
    }
    if entries.contains(&"*") {
        if entries.len() > 1 {
            return Err(CoordinatorError::Config(
                "ALLOWED_ORIGINS must not mix \"*\" with specific origins".into(),
            ));
        }
        return Ok(CorsOrigins::Any);
    }

    let mut origins = Vec::with_capacity(entries.len());
    for entry in entries {
        let value = entry
            .parse::<HeaderValue>()
            .map_err(|_| CoordinatorError::Config(format!("invalid origin: {entry}")))?;
        origins.push(value);
    }
    Ok(CorsOrigins::List(origins))
}

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    match origins {
        // A wildcard origin cannot be combined with credentials.
        CorsOrigins::Any => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        CorsOrigins::List(list) => CorsLayer::new()
            .allow_origin(AllowOrigin::list(list.iter().cloned()))
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
    }
}

// ── Router ───────────────────────────────────────────────────────────────────

/// Assemble the full pipeline. Layer order is contractual: CORS wraps
/// everything, then timeout → tracing → rate-limit → handler.
pub fn build_router(state: AppState, origins: &CorsOrigins) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/public-key", get(api::public_key))
        .route("/heartbeat", post(api::heartbeat))
        .route("/peers", get(api::peers))
        .route("/hardware/challenge", post(api::hardware_challenge))
        .route("/hardware/verify", post(api::hardware_verify))
        .route("/authorize", post(api::authorize))
        .route("/transactions/submit", post(api::submit_receipt))
        .route("/users/{public_key}/balance", get(api::user_balance))
        .route("/users/{public_key}/transactions", get(api::user_transactions))
        .route("/admin/audit", get(api::admin_audit))
        .route("/v1/models", get(api::models))
        .layer(
            ServiceBuilder::new()
                .layer(cors_layer(origins))
                .layer(axum::middleware::from_fn(middleware::enforce_deadlines))
                .layer(axum::middleware::from_fn(middleware::trace_requests))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    middleware::enforce_rate_limits,
                )),
        )
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    origins: &CorsOrigins,
) -> anyhow::Result<()> {
    let app = build_router(state, origins);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "coordinator API listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}
