//! Request and response payloads for the gateway's HTTP surface.
//!
//! The analysis payloads mirror what the downstream AI analysis service
//! accepts and returns; the gateway forwards them without interpreting the
//! suggestion content.

use serde::{Deserialize, Serialize};
use url::Url;

/// Body of `POST /analyze`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    /// GitHub repository to analyze.
    pub repo_url: Url,
}

/// Result of a successful analysis, passed through from the upstream service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub repo_url: String,
    /// Free-form feature suggestion produced by the analysis service.
    pub suggestion: serde_json::Value,
}

/// Generic JSON error body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_request_parsing() {
        let request: AnalyzeRequest =
            serde_json::from_str(r#"{"repoUrl": "https://github.com/rust-lang/rust"}"#).unwrap();
        assert_eq!(request.repo_url.host_str(), Some("github.com"));
    }

    #[test]
    fn test_analyze_request_rejects_invalid_url() {
        let result: Result<AnalyzeRequest, _> =
            serde_json::from_str(r#"{"repoUrl": "not a url"}"#);
        assert!(result.is_err());
    }
}
