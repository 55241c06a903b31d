//! Request admission and abuse control for the gateway.
//!
//! This module provides:
//! - Sliding-window rate limiting with a bounded store
//! - Heuristic bot/user-agent filtering
//! - Per-session concurrency control with RAII leases
//! - CAPTCHA token verification
//! - Static API key gating
//! - The ordered pipeline composing all of the above

pub mod admin_auth;
pub mod api_key;
pub mod bot_filter;
pub mod captcha;
pub mod concurrency;
pub mod deny;
pub mod identity;
pub mod pipeline;
pub mod rate_limit;

pub use admin_auth::AdminAuth;
pub use api_key::ApiKeyGate;
pub use bot_filter::BotFilter;
pub use captcha::CaptchaVerifier;
pub use concurrency::SessionGuard;
pub use deny::DenyReason;
pub use pipeline::{AdmissionPipeline, EnvOverrides};
pub use rate_limit::SlidingWindowLimiter;
