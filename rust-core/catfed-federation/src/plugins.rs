// SPDX-License-Identifier: PMPL-1.0-or-later
//! Ordered pre- and post-federation plugin chains.

use std::sync::Arc;
use tracing::warn;

use catfed_core::{
    PluginError, PluginFailure, PostFederatedQueryPlugin, PreFederatedQueryPlugin, QueryRequest,
    QueryResponse, Source,
};

use crate::error::FederationError;

/// Plugins are run in registration order.
#[derive(Clone, Default)]
pub struct PluginChain {
    pre: Vec<Arc<dyn PreFederatedQueryPlugin>>,
    post: Vec<Arc<dyn PostFederatedQueryPlugin>>,
}

impl PluginChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pre(mut self, plugin: Arc<dyn PreFederatedQueryPlugin>) -> Self {
        self.pre.push(plugin);
        self
    }

    pub fn with_post(mut self, plugin: Arc<dyn PostFederatedQueryPlugin>) -> Self {
        self.post.push(plugin);
        self
    }

    pub fn pre_count(&self) -> usize {
        self.pre.len()
    }

    pub fn post_count(&self) -> usize {
        self.post.len()
    }

    /// Run the pre-query chain for one source. Recoverable failures are
    /// appended to `failures`.
    pub async fn run_pre(
        &self,
        source: &dyn Source,
        request: QueryRequest,
        failures: &mut Vec<PluginFailure>,
    ) -> Result<QueryRequest, FederationError> {
        let mut current = request;
        for plugin in &self.pre {
            match plugin.process(source, &current).await {
                Ok(next) => current = next,
                Err(PluginError::Execution(message)) => {
                    warn!(
                        plugin = plugin.name(),
                        source_id = source.id(),
                        error = %message,
                        "Pre-federated query plugin failed, skipping it"
                    );
                    failures.push(PluginFailure {
                        plugin: plugin.name().to_string(),
                        source_id: Some(source.id().to_string()),
                        message,
                    });
                }
                Err(PluginError::StopProcessing(message)) => {
                    return Err(FederationError::StopProcessing {
                        plugin: plugin.name().to_string(),
                        message,
                    })
                }
            }
        }
        Ok(current)
    }

    /// Run the post-query chain over the merged response.
    pub async fn run_post(&self, response: QueryResponse) -> Result<QueryResponse, FederationError> {
        let mut current = response;
        for plugin in &self.post {
            match plugin.process(&current).await {
                Ok(next) => current = next,
                Err(PluginError::Execution(message)) => {
                    warn!(
                        plugin = plugin.name(),
                        error = %message,
                        "Post-federated query plugin failed, skipping it"
                    );
                    current.plugin_failures.push(PluginFailure {
                        plugin: plugin.name().to_string(),
                        source_id: None,
                        message,
                    });
                }
                Err(PluginError::StopProcessing(message)) => {
                    return Err(FederationError::StopProcessing {
                        plugin: plugin.name().to_string(),
                        message,
                    })
                }
            }
        }
        Ok(current)
    }
}

impl std::fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginChain")
            .field("pre", &self.pre.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("post", &self.post.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use catfed_core::{HitCount, Query, SourceError, SourceResponse};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    struct Named(&'static str);

    #[async_trait]
    impl Source for Named {
        fn id(&self) -> &str {
            self.0
        }

        async fn query(&self, _request: &QueryRequest) -> Result<SourceResponse, SourceError> {
            Ok(SourceResponse::new(vec![], 0))
        }
    }

    struct CapPage(u32);

    #[async_trait]
    impl PreFederatedQueryPlugin for CapPage {
        fn name(&self) -> &str {
            "cap-page"
        }

        async fn process(
            &self,
            _source: &dyn Source,
            request: &QueryRequest,
        ) -> Result<QueryRequest, PluginError> {
            Ok(request.with_query(request.query.with_page_size(self.0)))
        }
    }

    struct Failing(PluginError);

    #[async_trait]
    impl PreFederatedQueryPlugin for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn process(
            &self,
            _source: &dyn Source,
            _request: &QueryRequest,
        ) -> Result<QueryRequest, PluginError> {
            Err(self.0.clone())
        }
    }

    #[async_trait]
    impl PostFederatedQueryPlugin for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn process(&self, _response: &QueryResponse) -> Result<QueryResponse, PluginError> {
            Err(self.0.clone())
        }
    }

    fn empty_response() -> QueryResponse {
        QueryResponse {
            query_id: Uuid::new_v4(),
            request: QueryRequest::new(Query::new("*")),
            results: vec![],
            hits: HitCount::Unknown,
            processing_details: vec![],
            source_properties: BTreeMap::new(),
            site_list: vec![],
            plugin_failures: vec![],
        }
    }

    #[tokio::test]
    async fn test_execution_failure_is_skipped_and_recorded() {
        let chain = PluginChain::new()
            .with_pre(Arc::new(Failing(PluginError::Execution("ldap down".to_string()))))
            .with_pre(Arc::new(CapPage(5)));

        let mut failures = Vec::new();
        let request = chain
            .run_pre(&Named("wfs"), QueryRequest::new(Query::new("*")), &mut failures)
            .await
            .unwrap();

        assert_eq!(request.query.page_size(), 5);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].plugin, "failing");
        assert_eq!(failures[0].source_id.as_deref(), Some("wfs"));
    }

    #[tokio::test]
    async fn test_stop_processing_aborts_chain() {
        let chain = PluginChain::new()
            .with_pre(Arc::new(Failing(PluginError::StopProcessing("denied".to_string()))))
            .with_pre(Arc::new(CapPage(5)));

        let mut failures = Vec::new();
        let err = chain
            .run_pre(&Named("csw"), QueryRequest::new(Query::new("*")), &mut failures)
            .await
            .unwrap_err();
        assert!(matches!(err, FederationError::StopProcessing { plugin, .. } if plugin == "failing"));
    }

    #[tokio::test]
    async fn test_post_chain_records_failure_on_response() {
        let chain = PluginChain::new()
            .with_post(Arc::new(Failing(PluginError::Execution("audit sink full".to_string()))));
        let response = chain.run_post(empty_response()).await.unwrap();
        assert_eq!(response.plugin_failures.len(), 1);
        assert!(response.plugin_failures[0].source_id.is_none());

        let chain = PluginChain::new()
            .with_post(Arc::new(Failing(PluginError::StopProcessing("redaction failed".to_string()))));
        assert!(chain.run_post(empty_response()).await.is_err());
    }
}
