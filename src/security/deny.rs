//! Denial taxonomy for the guard pipeline.
//!
//! Every guard failure is terminal for the current request; retry is the
//! caller's responsibility, signaled via `Retry-After` where applicable.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Why a request was refused admission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DenyReason {
    /// The identity key exhausted its sliding-window budget.
    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },

    /// The user agent matched the automated-client heuristics.
    #[error("Access denied")]
    BotDetected,

    /// The protected endpoint requires an explicit session id.
    #[error("Missing session id")]
    MissingSessionId,

    /// Another request for the same session is still in flight.
    #[error("A request for this session is already in progress")]
    ConcurrentRequestInProgress,

    /// The global ceiling on active session leases was reached.
    #[error("Too many concurrent sessions")]
    SessionCapacityExceeded,

    /// A CAPTCHA token is required but was not supplied.
    #[error("CAPTCHA token required")]
    CaptchaRequired,

    /// The verification service rejected the supplied token.
    #[error("CAPTCHA verification failed")]
    CaptchaVerificationFailed { codes: Vec<String> },

    /// The verification service could not be reached or timed out.
    #[error("CAPTCHA verification service unavailable")]
    VerificationServiceUnavailable,

    /// Operator error: a required secret is absent in production.
    #[error("Service misconfigured")]
    ServiceMisconfigured,

    /// The supplied API key is missing or wrong.
    #[error("Invalid API key")]
    InvalidCredential,

    /// The emergency kill switch is engaged.
    #[error("Service temporarily disabled")]
    KillSwitchEngaged,
}

impl DenyReason {
    pub fn status(&self) -> StatusCode {
        match self {
            DenyReason::RateLimited { .. } | DenyReason::ConcurrentRequestInProgress => {
                StatusCode::TOO_MANY_REQUESTS
            }
            DenyReason::BotDetected | DenyReason::CaptchaVerificationFailed { .. } => {
                StatusCode::FORBIDDEN
            }
            DenyReason::MissingSessionId | DenyReason::CaptchaRequired => StatusCode::BAD_REQUEST,
            DenyReason::SessionCapacityExceeded
            | DenyReason::VerificationServiceUnavailable
            | DenyReason::ServiceMisconfigured
            | DenyReason::KillSwitchEngaged => StatusCode::SERVICE_UNAVAILABLE,
            DenyReason::InvalidCredential => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for DenyReason {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            DenyReason::RateLimited { retry_after_secs } => {
                let body = Json(json!({
                    "error": "Too many requests",
                    "retryAfter": retry_after_secs,
                }));
                let mut response = (status, body).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, retry_after_secs.into());
                response
            }
            // Deliberately generic: do not reveal what tripped the detection.
            DenyReason::BotDetected => {
                (status, Json(json!({ "error": "Access denied" }))).into_response()
            }
            DenyReason::CaptchaVerificationFailed { codes } => (
                status,
                Json(json!({
                    "error": "CAPTCHA verification failed",
                    "codes": codes,
                })),
            )
                .into_response(),
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}
