//! The request pipeline: timeout → request tracing → rate limiting.
//!
//! Ordering is part of the API contract. The timeout layer sits outermost so
//! a deadline cancels everything beneath it (the handler future is dropped,
//! which aborts any pending store I/O); tracing stamps every response that
//! made it past the deadline; rate limiting runs last so 429s are cheap.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::RngCore;
use serde_json::json;
use tracing::info;

use troop_core::constants::{
    DISCOVERY_LIMIT, FAST_TIMEOUT_SECS, INFERENCE_LIMIT, RATE_WINDOW_SECS, SLOW_TIMEOUT_SECS,
};

use crate::server::AppState;

// ── Client identity ──────────────────────────────────────────────────────────

/// The peer IP as seen by the listener, or "unknown" when the router is
/// driven without connect info (tests).
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Infallible> {
        Ok(Self(ip_from_extensions(&parts.extensions)))
    }
}

fn ip_from_extensions(extensions: &axum::http::Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

// ── Timeout enforcement ──────────────────────────────────────────────────────

/// Per-endpoint deadline by path prefix.
pub fn deadline_for(path: &str) -> Duration {
    const FAST_EXACT: [&str; 5] = ["/health", "/public-key", "/v1/models", "/peers", "/heartbeat"];
    if FAST_EXACT.contains(&path) || path.starts_with("/users/") {
        Duration::from_secs(FAST_TIMEOUT_SECS)
    } else {
        Duration::from_secs(SLOW_TIMEOUT_SECS)
    }
}

/// Outermost layer: race the rest of the pipeline against the deadline.
/// On expiry the inner future is dropped (in-flight work is cancelled, not
/// abandoned) and the client gets a 504 carrying the elapsed time.
pub async fn enforce_deadlines(req: Request, next: Next) -> Response {
    let deadline = deadline_for(req.uri().path());
    let started = Instant::now();

    match tokio::time::timeout(deadline, next.run(req)).await {
        Ok(mut response) => {
            set_elapsed_header(&mut response, started);
            response
        }
        Err(_) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let mut response = (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({
                    "error": "Gateway Timeout",
                    "message": format!("Request exceeded timeout of {}s", deadline.as_secs()),
                    "timeout_seconds": deadline.as_secs(),
                    "elapsed_ms": elapsed_ms,
                })),
            )
                .into_response();
            set_elapsed_header(&mut response, started);
            response
        }
    }
}

fn set_elapsed_header(response: &mut Response, started: Instant) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if let Ok(value) = HeaderValue::from_str(&elapsed_ms.to_string()) {
        response.headers_mut().insert("X-Timeout-Ms", value);
    }
}

// ── Request tracing ──────────────────────────────────────────────────────────

/// Assign or propagate a request id and stamp it, plus elapsed time, on the
/// response.
pub async fn trace_requests(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("X-Request-ID")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(new_request_id);
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let mut response = next.run(req).await;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("X-Request-ID", value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{elapsed_ms}ms")) {
        response.headers_mut().insert("X-Response-Time", value);
    }
    info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms,
        request_id,
        "request"
    );
    response
}

fn new_request_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ── Rate limiting ────────────────────────────────────────────────────────────

enum Bucket {
    Discovery,
    Inference,
}

impl Bucket {
    fn for_path(path: &str) -> Option<Self> {
        match path {
            "/heartbeat" | "/peers" | "/v1/models" => Some(Bucket::Discovery),
            "/authorize" => Some(Bucket::Inference),
            _ => None,
        }
    }

    fn limit(&self) -> u64 {
        match self {
            Bucket::Discovery => DISCOVERY_LIMIT,
            Bucket::Inference => INFERENCE_LIMIT,
        }
    }
}

/// Fixed-window limits per client IP. Dropped requests are audited and carry
/// `Retry-After`.
pub async fn enforce_rate_limits(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    let Some(bucket) = Bucket::for_path(&path) else {
        return next.run(req).await;
    };

    let ip = ip_from_extensions(req.extensions());
    let (allowed, _remaining) = match bucket {
        Bucket::Discovery => state.limiter.check_discovery(&ip),
        Bucket::Inference => state.limiter.check_inference(&ip),
    };
    if allowed {
        return next.run(req).await;
    }

    state.audit.rate_limit(&ip, &path, bucket.limit(), RATE_WINDOW_SECS);
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, RATE_WINDOW_SECS.to_string())],
        Json(json!({
            "error": "Rate limit exceeded",
            "limit": bucket.limit(),
            "window": "1 hour",
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlines_follow_the_endpoint_table() {
        let fast = Duration::from_secs(FAST_TIMEOUT_SECS);
        let slow = Duration::from_secs(SLOW_TIMEOUT_SECS);

        assert_eq!(deadline_for("/health"), fast);
        assert_eq!(deadline_for("/public-key"), fast);
        assert_eq!(deadline_for("/v1/models"), fast);
        assert_eq!(deadline_for("/peers"), fast);
        assert_eq!(deadline_for("/heartbeat"), fast);
        assert_eq!(deadline_for("/users/abc/balance"), fast);
        assert_eq!(deadline_for("/users/abc/transactions"), fast);

        assert_eq!(deadline_for("/authorize"), slow);
        assert_eq!(deadline_for("/hardware/challenge"), slow);
        assert_eq!(deadline_for("/hardware/verify"), slow);
        assert_eq!(deadline_for("/transactions/submit"), slow);
        assert_eq!(deadline_for("/anything/else"), slow);
    }

    #[test]
    fn buckets_cover_exactly_the_limited_paths() {
        assert!(matches!(Bucket::for_path("/heartbeat"), Some(Bucket::Discovery)));
        assert!(matches!(Bucket::for_path("/peers"), Some(Bucket::Discovery)));
        assert!(matches!(Bucket::for_path("/v1/models"), Some(Bucket::Discovery)));
        assert!(matches!(Bucket::for_path("/authorize"), Some(Bucket::Inference)));
        assert!(Bucket::for_path("/health").is_none());
        assert!(Bucket::for_path("/public-key").is_none());
        assert!(Bucket::for_path("/transactions/submit").is_none());
    }
}
