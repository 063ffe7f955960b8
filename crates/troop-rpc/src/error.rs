//! The single place typed coordinator errors become HTTP responses.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use troop_core::error::CoordinatorError;

pub struct ApiError(pub CoordinatorError);

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoordinatorError::ChallengeExpired
            | CoordinatorError::BadProofFormat
            | CoordinatorError::InvalidReceipt
            | CoordinatorError::UnknownNode(_)
            | CoordinatorError::UnknownRequester(_)
            | CoordinatorError::DuplicateSettlement(_) => StatusCode::BAD_REQUEST,
            CoordinatorError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            CoordinatorError::NoCapableIdleWorker(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoordinatorError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            CoordinatorError::InvalidAdminCredentials | CoordinatorError::InvalidTicket => {
                StatusCode::UNAUTHORIZED
            }
            CoordinatorError::KeyMaterial(_)
            | CoordinatorError::Serialization(_)
            | CoordinatorError::Storage(_)
            | CoordinatorError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "internal error surfaced as 500");
        }

        let body = Json(json!({ "detail": self.0.to_string() }));
        match &self.0 {
            CoordinatorError::InvalidAdminCredentials => {
                (status, [(header::WWW_AUTHENTICATE, "Basic")], body).into_response()
            }
            CoordinatorError::RateLimited { window_secs, .. } => (
                status,
                [(header::RETRY_AFTER, window_secs.to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}
