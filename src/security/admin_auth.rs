//! Admin-only authentication middleware.
//!
//! Separate from the API key gate so operational endpoints (guard-store
//! statistics) require elevated access. Admin endpoints are disabled entirely
//! unless `ADMIN_API_KEY` is set.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Validates the `X-Admin-Key` header against the `ADMIN_API_KEY` env var.
#[derive(Clone, Debug)]
pub struct AdminAuth {
    /// Optional admin API key. If None, admin endpoints are disabled.
    admin_key: Option<String>,
}

impl AdminAuth {
    pub fn from_env() -> Self {
        let admin_key = std::env::var("ADMIN_API_KEY").ok().filter(|k| !k.is_empty());

        if admin_key.is_some() {
            tracing::info!("Admin API key authentication enabled");
        } else {
            tracing::info!("Admin API key not configured - admin endpoints disabled");
        }

        Self { admin_key }
    }

    #[cfg(test)]
    pub fn with_key(admin_key: Option<String>) -> Self {
        Self { admin_key }
    }

    /// Middleware enforcing admin authentication.
    pub async fn middleware(&self, req: Request, next: Next) -> Response {
        let Some(ref configured_key) = self.admin_key else {
            tracing::warn!("Admin endpoint accessed but ADMIN_API_KEY not configured");
            return (
                StatusCode::UNAUTHORIZED,
                "Admin access disabled - ADMIN_API_KEY not configured",
            )
                .into_response();
        };

        let provided_key = req
            .headers()
            .get("X-Admin-Key")
            .and_then(|value| value.to_str().ok());

        match provided_key {
            Some(key) if key == configured_key => next.run(req).await,
            Some(_) => {
                tracing::warn!("Admin endpoint accessed with invalid key");
                (StatusCode::UNAUTHORIZED, "Invalid admin key").into_response()
            }
            None => {
                tracing::warn!("Admin endpoint accessed without X-Admin-Key header");
                (StatusCode::UNAUTHORIZED, "X-Admin-Key header required").into_response()
            }
        }
    }
}
