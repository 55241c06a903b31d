//! End-to-end tests of the composed guard pipeline over the real router.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Notify;
use tower::ServiceExt;

use crate::analyzer::{Analyzer, AnalyzerError};
use crate::config::{GatewayConfig, WindowPolicy};
use crate::handlers;
use crate::security::pipeline::{AdmissionPipeline, EnvOverrides, SESSION_HEADER};
use crate::types::{AnalyzeRequest, AnalyzeResponse};

const BROWSER_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

/// Answers instantly with a canned suggestion.
struct StubAnalyzer;

impl Analyzer for StubAnalyzer {
    type Error = AnalyzerError;

    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, Self::Error> {
        Ok(AnalyzeResponse {
            repo_url: request.repo_url.to_string(),
            suggestion: json!({ "title": "Add CI caching" }),
        })
    }
}

/// Blocks inside the guarded body until the test releases it, so a second
/// request can race the held session lease.
struct GatedAnalyzer {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl Analyzer for GatedAnalyzer {
    type Error = AnalyzerError;

    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, Self::Error> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(AnalyzeResponse {
            repo_url: request.repo_url.to_string(),
            suggestion: json!(null),
        })
    }
}

fn router<A>(config: &GatewayConfig, env: EnvOverrides, analyzer: A) -> Router
where
    A: Analyzer<Error = AnalyzerError> + 'static,
{
    let pipeline = AdmissionPipeline::new(config, env).unwrap();
    Router::new()
        .merge(handlers::routes().with_state(Arc::new(analyzer)))
        .layer(axum::middleware::from_fn(move |req, next| {
            let pipeline = pipeline.clone();
            async move { pipeline.middleware(req, next).await }
        }))
}

fn analyze_request(session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/analyze")
        .header(header::USER_AGENT, BROWSER_UA)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(session) = session {
        builder = builder.header(SESSION_HEADER, session);
    }
    builder
        .body(Body::from(
            r#"{"repoUrl": "https://github.com/rust-lang/rust"}"#,
        ))
        .unwrap()
}

fn get_request(path: &str, user_agent: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header(header::USER_AGENT, user_agent)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health_reachable_with_denied_user_agent() {
    let app = router(&GatewayConfig::default(), EnvOverrides::default(), StubAnalyzer);
    let response = app.oneshot(get_request("/health", "curl/7.68.0")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_kill_switch_takes_everything_down() {
    let mut config = GatewayConfig::default();
    config.security.kill_switch = true;
    let app = router(&config, EnvOverrides::default(), StubAnalyzer);

    let health = app
        .clone()
        .oneshot(get_request("/health", BROWSER_UA))
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::SERVICE_UNAVAILABLE);

    let analyze = app.oneshot(analyze_request(Some("s1"))).await.unwrap();
    assert_eq!(analyze.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_rate_limit_denial_beats_bot_denial() {
    let mut config = GatewayConfig::default();
    config.rate_limiting.default_policy = WindowPolicy {
        window_ms: 60_000,
        max_requests: 2,
    };
    let app = router(&config, EnvOverrides::default(), StubAnalyzer);

    // Within budget the bot filter answers; once the budget is spent the
    // rate limiter must answer first.
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(get_request("/", "curl/7.68.0"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    let response = app.oneshot(get_request("/", "curl/7.68.0")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap();
    assert!(retry_after >= 1);
}

#[tokio::test]
async fn test_analyze_descriptor_readable_without_session() {
    let app = router(&GatewayConfig::default(), EnvOverrides::default(), StubAnalyzer);
    // GET /analyze is cheap metadata; only the POST runs the full chain.
    let response = app.oneshot(get_request("/analyze", BROWSER_UA)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_session_id_rejected() {
    let app = router(&GatewayConfig::default(), EnvOverrides::default(), StubAnalyzer);
    let response = app.oneshot(analyze_request(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admitted_request_reaches_analyzer() {
    let app = router(&GatewayConfig::default(), EnvOverrides::default(), StubAnalyzer);
    let response = app.oneshot(analyze_request(Some("sess-ok"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let report: AnalyzeResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(report.repo_url, "https://github.com/rust-lang/rust");
}

#[tokio::test]
async fn test_concurrent_duplicate_session_denied() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let app = router(
        &GatewayConfig::default(),
        EnvOverrides::default(),
        GatedAnalyzer {
            started: Arc::clone(&started),
            release: Arc::clone(&release),
        },
    );

    let first = tokio::spawn({
        let app = app.clone();
        async move { app.oneshot(analyze_request(Some("sess-dup"))).await.unwrap() }
    });

    // Wait until the first request holds its lease inside the guarded body.
    started.notified().await;

    let second = app
        .clone()
        .oneshot(analyze_request(Some("sess-dup")))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    release.notify_one();
    let first = first.await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    // Lease released; the same session is admitted again.
    release.notify_one();
    let third = app.oneshot(analyze_request(Some("sess-dup"))).await.unwrap();
    assert_eq!(third.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_key_gate_enforced_when_configured() {
    let env = EnvOverrides {
        api_keys: ["k1".to_string()].into_iter().collect(),
        ..EnvOverrides::default()
    };
    let app = router(&GatewayConfig::default(), env, StubAnalyzer);

    let denied = app.clone().oneshot(analyze_request(Some("s1"))).await.unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let mut request = analyze_request(Some("s2"));
    request
        .headers_mut()
        .insert("x-api-key", "k1".parse().unwrap());
    let allowed = app.oneshot(request).await.unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_production_without_captcha_secret_fails_closed() {
    let env = EnvOverrides {
        production: true,
        ..EnvOverrides::default()
    };
    let app = router(&GatewayConfig::default(), env, StubAnalyzer);

    let response = app.oneshot(analyze_request(Some("s1"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_admin_stats_require_admin_key() {
    let pipeline =
        AdmissionPipeline::new(&GatewayConfig::default(), EnvOverrides::default()).unwrap();
    let auth = crate::security::AdminAuth::with_key(Some("adm-key".to_string()));
    let app = handlers::admin_routes()
        .layer(axum::middleware::from_fn(move |req, next| {
            let auth = auth.clone();
            async move { auth.middleware(req, next).await }
        }))
        .layer(axum::Extension(pipeline));

    let denied = app
        .clone()
        .oneshot(get_request("/admin/stats", BROWSER_UA))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let mut request = get_request("/admin/stats", BROWSER_UA);
    request
        .headers_mut()
        .insert("X-Admin-Key", "adm-key".parse().unwrap());
    let allowed = app.oneshot(request).await.unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_distinct_clients_do_not_share_counters() {
    let mut config = GatewayConfig::default();
    config.rate_limiting.default_policy = WindowPolicy {
        window_ms: 60_000,
        max_requests: 1,
    };
    let app = router(&config, EnvOverrides::default(), StubAnalyzer);

    let mut exhaust = get_request("/", BROWSER_UA);
    exhaust
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.1".parse().unwrap());
    app.clone().oneshot(exhaust).await.unwrap();

    let mut limited = get_request("/", BROWSER_UA);
    limited
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.1".parse().unwrap());
    let limited = app.clone().oneshot(limited).await.unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

    let mut other = get_request("/", BROWSER_UA);
    other
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.2".parse().unwrap());
    let other = app.oneshot(other).await.unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}
