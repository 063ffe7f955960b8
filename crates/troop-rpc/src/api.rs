//! Endpoint handlers.
//!
//! Handlers stay thin: decode, call into the fleet/credit/proof components,
//! audit security-relevant outcomes, and hand typed errors to [`ApiError`].

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::debug;

use troop_core::constants::{
    AUDIT_QUERY_MAX_LIMIT, ESTIMATED_JOB_DURATION, TICKET_DEFAULT_PROJECT,
};
use troop_core::error::CoordinatorError;
use troop_core::fleet::Heartbeat;
use troop_core::types::{JobId, NodeId, PublicKey};
use troop_crypto::ticket;
use troop_fleet::select_worker;

use crate::auth::require_admin;
use crate::error::ApiError;
use crate::middleware::ClientIp;
use crate::server::AppState;
use crate::types::*;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Transient store failures get one retry inside the handler boundary;
/// persistent failure surfaces as 500.
fn retry_once<T>(
    mut op: impl FnMut() -> Result<T, CoordinatorError>,
) -> Result<T, CoordinatorError> {
    match op() {
        Err(CoordinatorError::Storage(first)) => {
            debug!(error = %first, "retrying after transient storage error");
            op()
        }
        other => other,
    }
}

// ── Health / keys ────────────────────────────────────────────────────────────

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        service: "monkey-troop-coordinator".into(),
    })
}

pub async fn public_key(State(state): State<AppState>) -> Json<PublicKeyResponse> {
    Json(PublicKeyResponse {
        public_key: state.keys.public_key_pem().to_string(),
    })
}

// ── Fleet ────────────────────────────────────────────────────────────────────

pub async fn heartbeat(
    State(state): State<AppState>,
    Json(payload): Json<Heartbeat>,
) -> Result<Json<HeartbeatAck>, ApiError> {
    state.registry.record_heartbeat(&payload)?;
    Ok(Json(HeartbeatAck {
        status: "seen".into(),
    }))
}

pub async fn peers(
    State(state): State<AppState>,
    Query(query): Query<PeersQuery>,
) -> Json<PeersResponse> {
    let nodes = state.registry.list_peers(query.model.as_deref());
    Json(PeersResponse {
        count: nodes.len(),
        nodes,
    })
}

pub async fn models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let data = state
        .registry
        .list_all_models()
        .into_iter()
        .map(|id| ModelEntry {
            id,
            object: "model".into(),
            owned_by: "monkey-troop".into(),
        })
        .collect();
    Json(ModelsResponse {
        object: "list".into(),
        data,
    })
}

// ── Proof-of-hardware ────────────────────────────────────────────────────────

pub async fn hardware_challenge(
    State(state): State<AppState>,
    Json(req): Json<ChallengeRequest>,
) -> Json<ChallengeResponse> {
    let challenge = state.prover.issue_challenge(&NodeId::new(req.node_id));
    Json(ChallengeResponse {
        challenge_token: challenge.challenge_token,
        seed: challenge.seed,
        matrix_size: challenge.matrix_size,
    })
}

pub async fn hardware_verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let verification = state.prover.verify_proof(
        &NodeId::new(req.node_id),
        &req.challenge_token,
        &req.proof_hash,
        req.duration,
        &req.device_name,
        now(),
    )?;
    Ok(Json(VerifyResponse {
        status: "verified".into(),
        assigned_multiplier: verification.multiplier,
        tier: verification.tier.to_string(),
    }))
}

// ── Authorization ────────────────────────────────────────────────────────────

pub async fn authorize(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(req): Json<AuthorizeRequest>,
) -> Result<Json<AuthorizeResponse>, ApiError> {
    let requester = PublicKey::new(req.requester);
    let timestamp = now();

    let user = retry_once(|| state.credits.ensure_user(&requester, timestamp))?;

    if !state.credits.has_balance(&requester, ESTIMATED_JOB_DURATION)? {
        state.audit.authorization(
            &requester,
            &req.model,
            None,
            &ip,
            false,
            Some("insufficient_credits"),
        );
        return Err(CoordinatorError::InsufficientCredits {
            balance: user.balance_seconds,
            required: ESTIMATED_JOB_DURATION,
        }
        .into());
    }

    let selected = match select_worker(&state.registry, &req.model) {
        Ok(candidate) => candidate,
        Err(err) => {
            state.audit.authorization(
                &requester,
                &req.model,
                None,
                &ip,
                false,
                Some("no_nodes_available"),
            );
            return Err(err.into());
        }
    };

    state
        .credits
        .reserve(&requester, ESTIMATED_JOB_DURATION, timestamp)?;

    let token = ticket::mint(
        &state.keys,
        &requester,
        &selected.node_id,
        TICKET_DEFAULT_PROJECT,
        timestamp,
    )?;

    state
        .audit
        .authorization(&requester, &req.model, Some(&selected.node_id), &ip, true, None);

    Ok(Json(AuthorizeResponse {
        target_ip: selected.mesh_ip,
        token,
        estimated_cost: ESTIMATED_JOB_DURATION,
    }))
}

// ── Settlement ───────────────────────────────────────────────────────────────

pub async fn submit_receipt(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(receipt): Json<JobReceiptRequest>,
) -> Response {
    let job_id = JobId::new(receipt.job_id);
    let requester = PublicKey::new(receipt.requester_public_key);
    let node_id = NodeId::new(receipt.worker_node_id);

    let outcome = retry_once(|| {
        state.credits.settle(
            &job_id,
            &requester,
            &node_id,
            receipt.duration_seconds,
            &receipt.signature,
            now(),
        )
    });
    match outcome {
        Ok(settlement) => {
            state.audit.transaction(
                &job_id,
                &requester,
                &node_id,
                receipt.duration_seconds,
                settlement.credits_transferred,
                &ip,
            );
            Json(SettlementResponse {
                status: "success".into(),
                credits_transferred: settlement.credits_transferred,
                requester_balance: settlement.requester_balance,
                worker_balance: settlement.worker_balance,
            })
            .into_response()
        }
        Err(err) => {
            let kind = match &err {
                CoordinatorError::InvalidReceipt => "invalid_receipt",
                CoordinatorError::UnknownNode(_) => "unknown_node",
                CoordinatorError::UnknownRequester(_) => "unknown_requester",
                CoordinatorError::DuplicateSettlement(_) => "duplicate_settlement",
                // Transient failures are not security events.
                _ => return ApiError(err).into_response(),
            };
            state.audit.security(
                kind,
                json!({ "job_id": job_id.as_str(), "reason": err.to_string() }),
                Some(&ip),
            );
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "error", "message": err.to_string() })),
            )
                .into_response()
        }
    }
}

// ── Users ────────────────────────────────────────────────────────────────────

pub async fn user_balance(
    State(state): State<AppState>,
    Path(public_key): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let pk = PublicKey::new(public_key);
    let balance = state.credits.balance(&pk)?;
    Ok(Json(BalanceResponse {
        public_key: pk.0,
        balance_seconds: balance,
        balance_hours: (balance as f64 / 3600.0 * 100.0).round() / 100.0,
    }))
}

pub async fn user_transactions(
    State(state): State<AppState>,
    Path(public_key): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let pk = PublicKey::new(public_key);
    let transactions = state
        .credits
        .history(&pk, query.limit.unwrap_or(50))?
        .into_iter()
        .map(TransactionSummary::from)
        .collect();
    Ok(Json(TransactionsResponse { transactions }))
}

// ── Admin ────────────────────────────────────────────────────────────────────

pub async fn admin_audit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditLogsResponse>, ApiError> {
    require_admin(&headers, &state.admin_password)?;

    let limit = query.limit.unwrap_or(100).min(AUDIT_QUERY_MAX_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let logs = state.audit.query(
        limit,
        offset,
        query.event_type.as_deref(),
        query.user_id.as_deref(),
    )?;

    Ok(Json(AuditLogsResponse {
        count: logs.len(),
        logs,
        limit,
        offset,
    }))
}
