//! CAPTCHA token verification against a third-party siteverify service.
//!
//! The only guard that performs I/O. Posture is configuration-dependent:
//! production without a secret fails closed, development without a secret may
//! skip verification when explicitly allowed, and any infrastructure failure
//! of the verification call denies the request rather than letting it through.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::security::deny::DenyReason;

#[derive(Debug, Clone)]
pub struct CaptchaConfig {
    /// Shared secret for the verification service. `None` means unconfigured.
    pub secret: Option<String>,
    /// Whether this process runs in production (`APP_ENV=production`).
    pub production: bool,
    /// Outside production, allow requests without verification when no secret
    /// is configured. Explicit so both postures are assertable in tests.
    pub allow_unverified_when_unconfigured: bool,
    /// Third-party siteverify endpoint.
    pub verify_url: String,
    /// Upper bound on the verification call.
    pub timeout: Duration,
}

/// Verdict payload returned by the siteverify endpoint.
#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Asynchronous CAPTCHA verifier.
#[derive(Clone)]
pub struct CaptchaVerifier {
    config: Arc<CaptchaConfig>,
    http: reqwest::Client,
}

impl CaptchaVerifier {
    pub fn new(config: CaptchaConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    /// Verify a caller-supplied CAPTCHA token.
    ///
    /// Evaluation order:
    /// 1. production + no secret → `ServiceMisconfigured` (never silently allow)
    /// 2. no secret otherwise → allow only with the explicit unconfigured flag
    /// 3. secret but no token → `CaptchaRequired`
    /// 4. siteverify says no → `CaptchaVerificationFailed` with provider codes
    /// 5. siteverify unreachable or timed out → `VerificationServiceUnavailable`
    pub async fn verify(
        &self,
        token: Option<&str>,
        client_key: &str,
    ) -> Result<(), DenyReason> {
        let secret = match self.config.secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                if self.config.production {
                    tracing::error!(
                        "CAPTCHA secret not configured in production; refusing request"
                    );
                    return Err(DenyReason::ServiceMisconfigured);
                }
                if self.config.allow_unverified_when_unconfigured {
                    tracing::debug!("CAPTCHA verification skipped: no secret configured");
                    return Ok(());
                }
                return Err(DenyReason::ServiceMisconfigured);
            }
        };

        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(DenyReason::CaptchaRequired)?;

        let response = self
            .http
            .post(&self.config.verify_url)
            .form(&[
                ("secret", secret),
                ("response", token),
                ("remoteip", client_key),
            ])
            .send()
            .await
            .map_err(|error| {
                tracing::warn!(error = %error, "CAPTCHA verification request failed");
                DenyReason::VerificationServiceUnavailable
            })?;

        let verdict: SiteverifyResponse = response.json().await.map_err(|error| {
            tracing::warn!(error = %error, "CAPTCHA verification response unreadable");
            DenyReason::VerificationServiceUnavailable
        })?;

        if verdict.success {
            Ok(())
        } else {
            tracing::warn!(
                client = %client_key,
                codes = ?verdict.error_codes,
                "CAPTCHA token rejected"
            );
            Err(DenyReason::CaptchaVerificationFailed {
                codes: verdict.error_codes,
            })
        }
    }
}
