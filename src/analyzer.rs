//! Downstream analysis collaborator.
//!
//! The gateway does not analyze repositories itself; admitted requests are
//! forwarded to the LLM-backed analysis service. The [`Analyzer`] trait keeps
//! handlers generic so tests can substitute a local stub.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::types::{AnalyzeRequest, AnalyzeResponse};

/// Abstraction over the expensive analysis backend this gateway protects.
pub trait Analyzer: Send + Sync {
    /// The error type returned by this analyzer.
    type Error: Debug + Send;

    /// Run one repository analysis.
    fn analyze(
        &self,
        request: &AnalyzeRequest,
    ) -> impl Future<Output = Result<AnalyzeResponse, Self::Error>> + Send;
}

/// Errors from the HTTP-forwarding analyzer.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The upstream call failed at the transport level or timed out.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// The upstream answered with a non-success status.
    #[error("upstream returned status {0}")]
    Status(u16),
}

/// Forwards admitted requests to the configured analysis endpoint.
#[derive(Clone)]
pub struct UpstreamAnalyzer {
    http: reqwest::Client,
    endpoint: Url,
}

impl UpstreamAnalyzer {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, endpoint })
    }
}

impl Analyzer for UpstreamAnalyzer {
    type Error = AnalyzerError;

    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, Self::Error> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalyzerError::Status(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}
