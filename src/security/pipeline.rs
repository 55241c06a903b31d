//! Guard pipeline composer.
//!
//! Runs the admission guards in a fixed, cost-ordered chain and short-circuits
//! on the first denial: kill switch → exemption check → rate limit →
//! bot filter → (protected paths only) session concurrency → CAPTCHA →
//! API key. A denied request never executes a later guard's side effects;
//! in particular a rate-limited request neither acquires a session lease nor
//! consumes a CAPTCHA verification call.

use axum::extract::Request;
use axum::http::{Method, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::security::api_key::ApiKeyGate;
use crate::security::bot_filter::{BotFilter, BotFilterConfig};
use crate::security::captcha::{CaptchaConfig, CaptchaVerifier};
use crate::security::concurrency::{SessionGuard, SessionGuardConfig};
use crate::security::deny::DenyReason;
use crate::security::identity::resolve_client_key;
use crate::security::rate_limit::{
    RateDecision, RateLimitPolicy, SlidingWindowConfig, SlidingWindowLimiter,
};

/// Header carrying the caller's opaque session token.
pub const SESSION_HEADER: &str = "x-session-id";
/// Header carrying the externally issued CAPTCHA challenge token.
pub const CAPTCHA_HEADER: &str = "x-captcha-token";

/// Values resolved from the process environment rather than the config file.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub captcha_secret: Option<String>,
    pub production: bool,
    pub kill_switch: bool,
    pub api_keys: HashSet<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let captcha_secret = std::env::var("CAPTCHA_SECRET").ok().filter(|s| !s.is_empty());
        let production = std::env::var("APP_ENV")
            .map(|env| env.eq_ignore_ascii_case("production"))
            .unwrap_or(false);
        let kill_switch = std::env::var("GATEWAY_KILL_SWITCH")
            .map(|flag| flag == "1" || flag.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let api_keys = std::env::var("API_KEYS")
            .ok()
            .map(|keys| {
                keys.split(',')
                    .map(|key| key.trim().to_string())
                    .filter(|key| !key.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            captcha_secret,
            production,
            kill_switch,
            api_keys,
        }
    }
}

struct PipelineRoutes {
    kill_switch: bool,
    exempt_paths: Vec<String>,
    protected_paths: Vec<String>,
    default_policy: RateLimitPolicy,
    endpoint_policies: HashMap<String, RateLimitPolicy>,
    log_events: bool,
}

/// The composed admission-control pipeline, applied as axum middleware.
#[derive(Clone)]
pub struct AdmissionPipeline {
    routes: Arc<PipelineRoutes>,
    limiter: SlidingWindowLimiter,
    bot_filter: BotFilter,
    sessions: SessionGuard,
    captcha: CaptchaVerifier,
    api_key: ApiKeyGate,
}

/// Guard-store statistics for the admin surface.
#[derive(Debug, Clone)]
pub struct AdmissionStats {
    pub tracked_clients: usize,
    pub active_sessions: usize,
}

impl AdmissionPipeline {
    pub fn new(config: &GatewayConfig, env: EnvOverrides) -> Result<Self, reqwest::Error> {
        let routes = PipelineRoutes {
            kill_switch: config.security.kill_switch || env.kill_switch,
            exempt_paths: config.routes.exempt_paths.clone(),
            protected_paths: config.routes.protected_paths.clone(),
            default_policy: RateLimitPolicy {
                window: config.rate_limiting.default_policy.window(),
                max_requests: config.rate_limiting.default_policy.max_requests,
            },
            endpoint_policies: config
                .rate_limiting
                .endpoints
                .iter()
                .map(|(path, policy)| {
                    (
                        path.clone(),
                        RateLimitPolicy {
                            window: policy.window(),
                            max_requests: policy.max_requests,
                        },
                    )
                })
                .collect(),
            log_events: config.security.log_security_events,
        };

        let limiter = SlidingWindowLimiter::new(SlidingWindowConfig {
            enabled: config.rate_limiting.enabled,
            max_tracked_keys: config.rate_limiting.max_tracked_keys,
            whitelisted_ips: config.rate_limiting.whitelisted_ips.clone(),
        });
        let bot_filter = BotFilter::new(BotFilterConfig {
            enabled: config.bot_filter.enabled,
            min_length: config.bot_filter.min_user_agent_length,
            deny_patterns: config.bot_filter.deny_patterns.clone(),
        });
        let sessions = SessionGuard::new(SessionGuardConfig {
            max_active_sessions: config.concurrency.max_active_sessions,
            stale_after: Duration::from_secs(config.concurrency.stale_after_seconds),
        });
        let captcha = CaptchaVerifier::new(CaptchaConfig {
            secret: env.captcha_secret,
            production: env.production,
            allow_unverified_when_unconfigured: config
                .captcha
                .allow_unverified_when_unconfigured,
            verify_url: config.captcha.verify_url.clone(),
            timeout: Duration::from_secs(config.captcha.timeout_seconds),
        })?;
        let api_key = ApiKeyGate::new(env.api_keys);

        if routes.kill_switch {
            tracing::error!("Kill switch engaged: refusing all requests");
        }

        Ok(Self {
            routes: Arc::new(routes),
            limiter,
            bot_filter,
            sessions,
            captcha,
            api_key,
        })
    }

    /// Middleware applying the full guard chain to one request.
    pub async fn middleware(&self, req: Request, next: Next) -> Response {
        // Checked before anything else, including the health exemption.
        if self.routes.kill_switch {
            return DenyReason::KillSwitchEngaged.into_response();
        }

        let path = req.uri().path().to_string();
        if self.is_exempt(&path) {
            return next.run(req).await;
        }

        let client_key = resolve_client_key(&req);

        // Rate limit first: the cheapest check, and the one that must win
        // when several guards would deny the same request.
        let (bucket, policy) = self.policy_for(&path, &client_key);
        if let RateDecision::Limited { retry_after_secs } =
            self.limiter.check_and_consume(&bucket, &policy)
        {
            if self.routes.log_events {
                tracing::warn!(
                    client = %client_key,
                    path = %path,
                    retry_after_secs,
                    "Rate limit exceeded"
                );
            }
            return DenyReason::RateLimited { retry_after_secs }.into_response();
        }

        let user_agent = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if self.bot_filter.is_blocked(user_agent.as_deref()) {
            if self.routes.log_events {
                tracing::warn!(
                    client = %client_key,
                    path = %path,
                    user_agent = user_agent.as_deref().unwrap_or("<absent>"),
                    "Request blocked: automated client heuristics"
                );
            }
            return DenyReason::BotDetected.into_response();
        }

        if !self.needs_full_chain(&path, req.method()) {
            return next.run(req).await;
        }

        // Stateful per-session check. The lease is held for the remainder of
        // this function, so it covers the CAPTCHA await, the credential check,
        // and the downstream call; Drop releases it on every exit path.
        let session_token = req
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let _lease = match self.sessions.enter(session_token.as_deref()) {
            Ok(lease) => lease,
            Err(reason) => {
                if self.routes.log_events {
                    tracing::warn!(client = %client_key, reason = %reason, "Session guard denied request");
                }
                return reason.into_response();
            }
        };

        let captcha_token = req
            .headers()
            .get(CAPTCHA_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if let Err(reason) = self.captcha.verify(captcha_token.as_deref(), &client_key).await {
            return reason.into_response();
        }

        if let Err(reason) = self.api_key.check(req.headers()) {
            if self.routes.log_events {
                tracing::warn!(client = %client_key, "Request blocked: invalid API key");
            }
            return reason.into_response();
        }

        next.run(req).await
    }

    /// Run the periodic maintenance pass over both guard stores.
    pub fn sweep(&self) {
        self.limiter.sweep();
        self.sessions.sweep();
    }

    /// Tear down all in-memory guard state. Used on graceful shutdown.
    pub fn clear(&self) {
        self.limiter.clear();
        self.sessions.clear();
    }

    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            tracked_clients: self.limiter.tracked_keys(),
            active_sessions: self.sessions.active_sessions(),
        }
    }

    fn is_exempt(&self, path: &str) -> bool {
        self.routes
            .exempt_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    fn is_protected(&self, path: &str) -> bool {
        self.routes
            .protected_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Only state-changing calls on protected paths run the expensive tail
    /// of the chain; reading the endpoint descriptor stays cheap.
    fn needs_full_chain(&self, path: &str, method: &Method) -> bool {
        self.is_protected(path)
            && !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    /// Pick the rate-limit policy for a path. Endpoint overrides get their own
    /// counter bucket so the strict window does not share state with the
    /// lenient default one.
    fn policy_for(&self, path: &str, client_key: &str) -> (String, RateLimitPolicy) {
        match self.routes.endpoint_policies.get(path) {
            Some(policy) => (format!("{path}|{client_key}"), *policy),
            None => (client_key.to_string(), self.routes.default_policy),
        }
    }
}
