//! HTTP endpoints exposed by the gateway.
//!
//! The only expensive operation is `POST /analyze`, which forwards admitted
//! requests to the downstream analysis service. Everything else is cheap
//! metadata: a greeting, an endpoint description, a health probe for
//! orchestration, and an admin statistics surface.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router, response::IntoResponse};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

use crate::analyzer::{Analyzer, AnalyzerError};
use crate::security::pipeline::{AdmissionPipeline, CAPTCHA_HEADER, SESSION_HEADER};
use crate::types::{AnalyzeRequest, ErrorResponse};

pub fn routes<A>() -> Router<Arc<A>>
where
    A: Analyzer<Error = AnalyzerError> + 'static,
{
    Router::new()
        .route("/", get(get_root))
        .route("/health", get(get_health))
        .route("/analyze", get(get_analyze_info))
        .route("/analyze", post(post_analyze::<A>))
}

pub fn admin_routes() -> Router {
    Router::new().route("/admin/stats", get(get_admin_stats))
}

/// `GET /`: Returns a simple greeting message from the gateway.
#[instrument(skip_all)]
pub async fn get_root() -> impl IntoResponse {
    let pkg_name = env!("CARGO_PKG_NAME");
    (StatusCode::OK, format!("Hello from {pkg_name}!"))
}

/// `GET /health`: Liveness probe for orchestration.
///
/// Exempt from every guard so probes stay reachable even when the pipeline is
/// partially misconfigured. Only the kill switch takes this down.
#[instrument(skip_all)]
pub async fn get_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// `GET /analyze`: Returns a machine-readable description of the `/analyze`
/// endpoint, including the admission headers the full guard chain expects.
#[instrument(skip_all)]
pub async fn get_analyze_info() -> impl IntoResponse {
    Json(json!({
        "endpoint": "/analyze",
        "description": "POST to request an AI analysis of a GitHub repository",
        "body": {
            "repoUrl": "https://github.com/<owner>/<repo>",
        },
        "headers": {
            (SESSION_HEADER): "opaque session token (required)",
            (CAPTCHA_HEADER): "CAPTCHA challenge token (when configured)",
            "x-api-key": "API key (when configured)",
        }
    }))
}

/// `GET /admin/stats`: Returns guard-store statistics.
///
/// Requires admin authentication via the `X-Admin-Key` header.
#[instrument(skip_all)]
pub async fn get_admin_stats(
    Extension(pipeline): Extension<AdmissionPipeline>,
) -> impl IntoResponse {
    let stats = pipeline.stats();
    (
        StatusCode::OK,
        Json(json!({
            "tracked_clients": stats.tracked_clients,
            "active_sessions": stats.active_sessions,
        })),
    )
}

/// `POST /analyze`: Forward an admitted analysis request downstream.
///
/// By the time this handler runs the request has cleared the full guard
/// chain; the session lease is still held and is released when the response
/// completes.
#[instrument(skip_all)]
pub async fn post_analyze<A>(
    State(analyzer): State<Arc<A>>,
    Json(body): Json<AnalyzeRequest>,
) -> impl IntoResponse
where
    A: Analyzer<Error = AnalyzerError>,
{
    match analyzer.analyze(&body).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(error) => {
            tracing::warn!(
                error = ?error,
                repo_url = %body.repo_url,
                "Analysis request failed"
            );
            error.into_response()
        }
    }
}

impl IntoResponse for AnalyzerError {
    fn into_response(self) -> Response {
        // The upstream's failure detail stays in the logs; callers get a
        // uniform gateway error.
        (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse {
                error: "Analysis service unavailable".to_string(),
            }),
        )
            .into_response()
    }
}
