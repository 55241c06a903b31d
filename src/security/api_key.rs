//! Static API key gate.
//!
//! Keys are loaded from the `API_KEYS` environment variable (comma-separated)
//! and supplied by callers via the `x-api-key` header. When no keys are
//! configured the gate is open: a deliberate convenience for local operation,
//! logged loudly at startup.

use axum::http::HeaderMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::security::deny::DenyReason;

/// Compares a caller-supplied key against the configured secret set.
#[derive(Clone)]
pub struct ApiKeyGate {
    /// Set of valid API keys. If empty, the gate is open.
    api_keys: Arc<HashSet<String>>,
}

impl ApiKeyGate {
    pub fn new(api_keys: HashSet<String>) -> Self {
        if api_keys.is_empty() {
            tracing::warn!("API key gate open: no API_KEYS configured");
        } else {
            tracing::info!(count = api_keys.len(), "API key gate enabled");
        }
        Self {
            api_keys: Arc::new(api_keys),
        }
    }

    /// Check if the gate requires a key at all.
    pub fn is_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    /// Validate the `x-api-key` header. Open gate allows everything.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), DenyReason> {
        if !self.is_enabled() {
            return Ok(());
        }

        let supplied = headers
            .get("x-api-key")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(DenyReason::InvalidCredential)?;

        if self.api_keys.contains(supplied) {
            Ok(())
        } else {
            Err(DenyReason::InvalidCredential)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn gate(keys: &[&str]) -> ApiKeyGate {
        ApiKeyGate::new(keys.iter().map(|k| k.to_string()).collect())
    }

    #[test]
    fn test_open_gate_allows_without_key() {
        let gate = gate(&[]);
        assert!(!gate.is_enabled());
        assert!(gate.check(&HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_valid_key_accepted() {
        let gate = gate(&["test-key-123"]);
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("test-key-123"));
        assert!(gate.check(&headers).is_ok());
    }

    #[test]
    fn test_wrong_key_denied() {
        let gate = gate(&["test-key-123"]);
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("wrong-key"));
        assert_eq!(gate.check(&headers).unwrap_err(), DenyReason::InvalidCredential);
    }

    #[test]
    fn test_missing_key_denied_when_enabled() {
        let gate = gate(&["test-key-123"]);
        assert_eq!(
            gate.check(&HeaderMap::new()).unwrap_err(),
            DenyReason::InvalidCredential
        );
    }
}
