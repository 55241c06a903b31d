//! Admission-control gateway HTTP entrypoint.
//!
//! This binary launches an Axum-based HTTP server that fronts the RepoLens
//! AI repository-analysis service with a composable guard pipeline.
//!
//! Endpoints:
//! - `GET /` – Greeting
//! - `GET /health` – Liveness probe (guard-exempt)
//! - `GET /analyze` – Machine-readable description of the analysis endpoint
//! - `POST /analyze` – Forward an admitted analysis request downstream
//! - `GET /admin/stats` – Guard-store statistics (admin key required)
//!
//! Every non-exempt request passes the guard chain: rate limit → bot filter →
//! (protected paths) session concurrency → CAPTCHA → API key.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control binding address
//! - `CAPTCHA_SECRET`, `API_KEYS`, `ADMIN_API_KEY` carry secrets
//! - `APP_ENV=production` switches the CAPTCHA verifier to fail-closed
//! - `GATEWAY_KILL_SWITCH=1` refuses all traffic

use axum::http::Method;
use axum::{Extension, Router};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors;
use url::Url;

use crate::analyzer::UpstreamAnalyzer;
use crate::config::GatewayConfig;
use crate::security::{AdminAuth, AdmissionPipeline, EnvOverrides};
use crate::sig_down::SigDown;
use crate::telemetry::Telemetry;

#[cfg(test)]
mod admission_tests;
mod analyzer;
mod config;
mod handlers;
mod security;
mod sig_down;
mod telemetry;
mod types;

/// Initializes the gateway server.
///
/// - Loads `.env` variables.
/// - Initializes tracing.
/// - Builds the guard pipeline and the upstream analyzer client.
/// - Starts an Axum HTTP server with the admission middleware applied.
///
/// Binds to the address specified by the `HOST` and `PORT` env vars.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env variables
    dotenv().ok();

    let telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    // Load configuration
    let app_config = match GatewayConfig::from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            tracing::info!("Using default configuration");
            GatewayConfig::default()
        }
    };

    // Abort early if the upstream analysis endpoint is unusable
    let analysis_url = match app_config.upstream.analysis_url.parse::<Url>() {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(
                "Invalid upstream analysis URL {:?}: {}",
                app_config.upstream.analysis_url,
                e
            );
            std::process::exit(1);
        }
    };
    let analyzer = UpstreamAnalyzer::new(
        analysis_url,
        Duration::from_secs(app_config.upstream.timeout_seconds),
    )?;
    let axum_state = Arc::new(analyzer);

    // Initialize the admission pipeline and admin surface
    let pipeline = AdmissionPipeline::new(&app_config, EnvOverrides::from_env())?;
    let admin_auth = AdminAuth::from_env();

    // Configure CORS
    let cors_layer = if app_config.cors.allowed_origins.is_empty() {
        tracing::info!("CORS: Allowing all origins (*)");
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any)
    } else {
        tracing::info!("CORS: Restricting to {:?}", app_config.cors.allowed_origins);
        let origins: Vec<_> = app_config
            .cors
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        cors::CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any)
    };

    let admission = pipeline.clone();
    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(axum_state))
        .merge(
            handlers::admin_routes()
                .layer(axum::middleware::from_fn(move |req, next| {
                    let auth = admin_auth.clone();
                    async move { auth.middleware(req, next).await }
                }))
                .layer(Extension(pipeline.clone())),
        )
        .layer(axum::middleware::from_fn(move |req, next| {
            let admission = admission.clone();
            async move { admission.middleware(req, next).await }
        }))
        .layer(tower_http::limit::RequestBodyLimitLayer::new(
            app_config.request.max_body_size_bytes,
        ))
        .layer(telemetry.http_tracing())
        .layer(cors_layer);

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::new(host.parse().expect("HOST must be a valid IP address"), port);
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        });

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();

    // Periodic maintenance over the guard stores
    let sweeper = pipeline.clone();
    let sweeper_cancellation = axum_cancellation_token.clone();
    let cleanup_interval = Duration::from_secs(app_config.security.cleanup_interval_seconds);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => sweeper.sweep(),
                _ = sweeper_cancellation.cancelled() => break,
            }
        }
    });

    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(
        listener,
        http_endpoints.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(axum_graceful_shutdown)
    .await?;

    // Tear down process-scoped guard state
    pipeline.clear();
    tracing::info!("Guard stores cleared, shutdown complete");

    Ok(())
}
