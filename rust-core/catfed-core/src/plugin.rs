// SPDX-License-Identifier: PMPL-1.0-or-later
//! Federated query plugin interfaces.
//!
//! Plugins take their input by reference and return a new value. A plugin
//! that fails with [`PluginError::Execution`] is skipped, and the chain
//! continues with the input it was given.

use async_trait::async_trait;

use crate::error::PluginError;
use crate::query::QueryRequest;
use crate::response::QueryResponse;
use crate::source::Source;

/// Runs once per source, immediately before that source is queried.
#[async_trait]
pub trait PreFederatedQueryPlugin: Send + Sync {
    fn name(&self) -> &str;

    async fn process(
        &self,
        source: &dyn Source,
        request: &QueryRequest,
    ) -> Result<QueryRequest, PluginError>;
}

/// Runs once on the merged response, before it is returned to the caller.
#[async_trait]
pub trait PostFederatedQueryPlugin: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, response: &QueryResponse) -> Result<QueryResponse, PluginError>;
}
