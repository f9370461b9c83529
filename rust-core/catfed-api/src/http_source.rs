// SPDX-License-Identifier: PMPL-1.0-or-later
//! HTTP-backed catalog source.
//!
//! The remote end receives the `QueryRequest` as JSON on `POST {endpoint}/query`
//! and answers with a `SourceResponse` body.

use async_trait::async_trait;
use tracing::{debug, instrument};

use catfed_core::{QueryRequest, Source, SourceError, SourceResponse};

use crate::{install_crypto_provider, ApiError};

/// Shared client for all HTTP sources.
pub fn build_client() -> Result<reqwest::Client, ApiError> {
    install_crypto_provider();
    reqwest::Client::builder()
        .user_agent(concat!("catfed/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ApiError::Internal(format!("failed to build HTTP client: {}", e)))
}

/// A catalog reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    id: String,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn query_url(&self) -> String {
        format!("{}/query", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl Source for HttpSource {
    fn id(&self) -> &str {
        &self.id
    }

    #[instrument(skip(self, request), fields(source_id = %self.id))]
    async fn query(&self, request: &QueryRequest) -> Result<SourceResponse, SourceError> {
        let url = self.query_url();
        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| SourceError::Transport(format!("request to {} failed: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(SourceError::Transport(format!(
                "{} returned status {}",
                url,
                resp.status()
            )));
        }

        let mut response: SourceResponse = resp.json().await.map_err(|e| {
            SourceError::InvalidResponse(format!("failed to parse response from {}: {}", url, e))
        })?;

        for record in &mut response.results {
            if record.metacard.source_id.is_empty() {
                record.metacard.source_id = self.id.clone();
            }
        }
        debug!(returned = response.results.len(), "Remote source answered");
        Ok(response)
    }
}
