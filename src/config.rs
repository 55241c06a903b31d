//! Configuration file parsing for the admission-control gateway.
//!
//! This module handles loading and parsing the `config.toml` file for
//! guard-pipeline settings: rate limiting, bot filtering, per-session
//! concurrency, CAPTCHA verification, CORS, and request size limits.
//!
//! Configuration is optional and defaults to permissive development settings.
//! Secrets (`CAPTCHA_SECRET`, `API_KEYS`, `ADMIN_API_KEY`) are never read from
//! the config file; they come from the environment.

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub rate_limiting: RateLimitingConfig,
    pub bot_filter: BotFilterSettings,
    pub concurrency: ConcurrencySettings,
    pub captcha: CaptchaSettings,
    pub routes: RouteSettings,
    pub cors: CorsConfig,
    pub request: RequestConfig,
    pub security: SecuritySettings,
    pub upstream: UpstreamConfig,
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    ///
    /// If the file doesn't exist, returns the default configuration.
    /// If the file exists but is malformed, returns an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()
    }

    /// Load configuration from environment variable CONFIG_FILE or default path.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::from_file(config_path)
    }
}

/// One sliding-window rate-limit policy: at most `max_requests` per `window_ms`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowPolicy {
    pub window_ms: u64,
    pub max_requests: u32,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_requests: 100,
        }
    }
}

impl WindowPolicy {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    /// Enable rate limiting globally.
    pub enabled: bool,
    /// Lenient default policy applied to every non-exempt path.
    pub default_policy: WindowPolicy,
    /// Stricter per-endpoint overrides, keyed by exact request path.
    pub endpoints: HashMap<String, WindowPolicy>,
    /// Maximum number of tracked identity keys before eviction kicks in.
    pub max_tracked_keys: usize,
    /// Networks that bypass rate limiting (orchestration, internal probes).
    #[serde(with = "ip_list_serde")]
    pub whitelisted_ips: Vec<IpNetwork>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        let mut endpoints = HashMap::new();
        // The analysis endpoint is LLM-backed and expensive; hold it to a
        // much tighter budget than the rest of the surface.
        endpoints.insert(
            "/analyze".to_string(),
            WindowPolicy {
                window_ms: 60_000,
                max_requests: 10,
            },
        );
        Self {
            enabled: true,
            default_policy: WindowPolicy::default(),
            endpoints,
            max_tracked_keys: 10_000,
            whitelisted_ips: vec![],
        }
    }
}

/// User-agent classification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BotFilterSettings {
    /// Enable bot filtering.
    pub enabled: bool,
    /// User-agent strings shorter than this are treated as automated clients.
    pub min_user_agent_length: usize,
    /// Case-insensitive substrings that mark a user agent as automated.
    pub deny_patterns: Vec<String>,
}

impl Default for BotFilterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_user_agent_length: 16,
            deny_patterns: vec![
                "bot".to_string(),
                "crawler".to_string(),
                "spider".to_string(),
                "scrapy".to_string(),
                "curl".to_string(),
                "wget".to_string(),
                "python-requests".to_string(),
                "go-http-client".to_string(),
                "libwww".to_string(),
                "httpclient".to_string(),
                "okhttp".to_string(),
                "headlesschrome".to_string(),
                "phantomjs".to_string(),
                "selenium".to_string(),
                "puppeteer".to_string(),
                "playwright".to_string(),
            ],
        }
    }
}

/// Per-session concurrency guard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConcurrencySettings {
    /// Ceiling on simultaneously held session leases.
    pub max_active_sessions: usize,
    /// Leases older than this are considered wedged and swept.
    pub stale_after_seconds: u64,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self {
            max_active_sessions: 100,
            stale_after_seconds: 600, // 10 minutes
        }
    }
}

/// CAPTCHA verification configuration.
///
/// The verification secret itself comes from the `CAPTCHA_SECRET` environment
/// variable; `APP_ENV=production` switches the verifier to fail-closed mode.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptchaSettings {
    /// Third-party siteverify endpoint.
    pub verify_url: String,
    /// Upper bound on the verification call, in seconds.
    pub timeout_seconds: u64,
    /// Allow requests without verification when no secret is configured.
    /// Only honored outside production; production without a secret always
    /// fails closed.
    pub allow_unverified_when_unconfigured: bool,
}

impl Default for CaptchaSettings {
    fn default() -> Self {
        Self {
            verify_url: "https://challenges.cloudflare.com/turnstile/v0/siteverify".to_string(),
            timeout_seconds: 5,
            allow_unverified_when_unconfigured: true,
        }
    }
}

/// Route classification for the guard pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteSettings {
    /// Path prefixes that skip the entire pipeline (health probes, assets).
    pub exempt_paths: Vec<String>,
    /// Path prefixes that get the full guard chain, not just the cheap checks.
    pub protected_paths: Vec<String>,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            exempt_paths: vec![
                "/health".to_string(),
                "/favicon.ico".to_string(),
                "/assets/".to_string(),
            ],
            protected_paths: vec!["/analyze".to_string()],
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// List of allowed origins. Empty list means allow all (*).
    pub allowed_origins: Vec<String>,
}

/// Request validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Maximum request body size in bytes (default 64KB; analysis requests
    /// carry only a repository URL).
    pub max_body_size_bytes: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_body_size_bytes: 65_536,
        }
    }
}

/// Security-related configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Log security-related events (rate limits, bot denials, auth failures).
    pub log_security_events: bool,
    /// Cleanup interval for the rate-limit and session stores (in seconds).
    pub cleanup_interval_seconds: u64,
    /// Emergency kill switch: deny every request, including health probes.
    /// Also settable via the `GATEWAY_KILL_SWITCH` environment variable.
    pub kill_switch: bool,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            log_security_events: true,
            cleanup_interval_seconds: 300, // 5 minutes
            kill_switch: false,
        }
    }
}

/// Downstream analysis service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Endpoint of the LLM-backed analysis service this gateway protects.
    pub analysis_url: String,
    /// Timeout for forwarded analysis calls, in seconds.
    pub timeout_seconds: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            analysis_url: "http://127.0.0.1:9100/analyze".to_string(),
            timeout_seconds: 120,
        }
    }
}

/// Custom serde module for IP network lists.
mod ip_list_serde {
    use ipnetwork::IpNetwork;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S>(ips: &Vec<IpNetwork>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let strings: Vec<String> = ips.iter().map(|ip| ip.to_string()).collect();
        serializer.collect_seq(strings)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<IpNetwork>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let strings: Vec<String> = Vec::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| IpNetwork::from_str(&s).map_err(serde::de::Error::custom))
            .collect()
    }
}
