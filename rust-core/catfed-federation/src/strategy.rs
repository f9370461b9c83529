// SPDX-License-Identifier: PMPL-1.0-or-later
//! Federation strategy: one orchestration path for both merge policies.
//!
//! ```text
//! request ─▶ validate ─▶ pre plugins (per source) ─▶ dispatch ─▶ drain ─▶ close ─▶ post plugins
//!                                                      │  outcomes  ▲
//!                                                      └────────────┘
//! ```
//!
//! The deadline is computed once, just before dispatch, and every wait on
//! the outcome channel is bounded by what remains of it. Sources still
//! outstanding when it passes are recorded as timed out and their tasks are
//! cancelled. The deadline applies to FIFO and sorted federations alike.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use catfed_core::{
    PostFederatedQueryPlugin, PreFederatedQueryPlugin, Query, QueryRequest, QueryResponse, Source,
};

use crate::aggregator::{MergePolicy, ResultAggregator};
use crate::comparator::SortPolicy;
use crate::config::FederationConfig;
use crate::dispatcher::{Dispatch, DispatchTarget, Dispatcher, TaskOutcome};
use crate::error::FederationError;
use crate::metrics::FederationMetrics;
use crate::plugins::PluginChain;
use crate::pool::WorkerPool;

/// Which merge policy a strategy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicyKind {
    /// Arrival order, no global sort.
    Fifo,
    /// Wait for every source, then sort by the query's sort policy.
    #[default]
    Sorted,
}

impl MergePolicyKind {
    /// Resolve the concrete policy for a query.
    pub fn for_query(self, query: &Query) -> MergePolicy {
        match self {
            MergePolicyKind::Fifo => MergePolicy::Fifo,
            MergePolicyKind::Sorted => MergePolicy::Sorted(SortPolicy::resolve(query.sort())),
        }
    }
}

impl fmt::Display for MergePolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergePolicyKind::Fifo => write!(f, "fifo"),
            MergePolicyKind::Sorted => write!(f, "sorted"),
        }
    }
}

/// Fans queries out to sources and merges the answers.
///
/// Cloning is cheap; clones share the worker pool, plugins and metrics.
#[derive(Clone, Debug)]
pub struct FederationStrategy {
    kind: MergePolicyKind,
    config: FederationConfig,
    dispatcher: Dispatcher,
    plugins: PluginChain,
    metrics: Option<FederationMetrics>,
}

impl FederationStrategy {
    pub fn new(kind: MergePolicyKind, config: FederationConfig) -> Result<Self, FederationError> {
        config.validate()?;
        let pool = WorkerPool::from_config(&config);
        Ok(Self {
            kind,
            config,
            dispatcher: Dispatcher::new(pool),
            plugins: PluginChain::new(),
            metrics: None,
        })
    }

    pub fn fifo(config: FederationConfig) -> Result<Self, FederationError> {
        Self::new(MergePolicyKind::Fifo, config)
    }

    pub fn sorted(config: FederationConfig) -> Result<Self, FederationError> {
        Self::new(MergePolicyKind::Sorted, config)
    }

    /// Share an existing pool, e.g. between a FIFO and a sorted strategy.
    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.dispatcher = Dispatcher::new(pool);
        self
    }

    pub fn with_pre_plugin(mut self, plugin: Arc<dyn PreFederatedQueryPlugin>) -> Self {
        self.plugins = self.plugins.with_pre(plugin);
        self
    }

    pub fn with_post_plugin(mut self, plugin: Arc<dyn PostFederatedQueryPlugin>) -> Self {
        self.plugins = self.plugins.with_post(plugin);
        self
    }

    pub fn with_metrics(mut self, metrics: FederationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn kind(&self) -> MergePolicyKind {
        self.kind
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    pub fn pool(&self) -> &WorkerPool {
        self.dispatcher.pool()
    }

    /// Run `request` against `sources` and merge the results.
    ///
    /// Source failures are reported in the response's processing details.
    /// Errors are returned only for malformed queries, an empty source
    /// selection, or a plugin that stops processing. A stop raised by a
    /// pre-query plugin prevents every source from being queried.
    #[instrument(
        skip_all,
        fields(query_id = tracing::field::Empty, policy = %self.kind, sources = sources.len())
    )]
    pub async fn federate(
        &self,
        sources: &[Arc<dyn Source>],
        request: QueryRequest,
    ) -> Result<QueryResponse, FederationError> {
        let started = Instant::now();
        let query_id = Uuid::new_v4();
        tracing::Span::current().record("query_id", tracing::field::display(query_id));
        if let Some(metrics) = &self.metrics {
            metrics.federation_started();
        }

        let request = self.with_default_timeout(request);
        self.validate(&request.query)?;
        let selected = select_sources(sources)?;
        let policy = self.kind.for_query(&request.query);

        let paged = request.with_query(paged_for_sources(&request.query));
        let mut plugin_failures = Vec::new();
        let mut targets = Vec::with_capacity(selected.len());
        for source in &selected {
            let per_source = self
                .plugins
                .run_pre(source.as_ref(), paged.clone(), &mut plugin_failures)
                .await?;
            targets.push(DispatchTarget {
                source: Arc::clone(source),
                request: per_source,
            });
        }

        let site_list: Vec<String> = selected.iter().map(|s| s.id().to_string()).collect();
        let timeout = request.query.timeout();
        info!(
            sites = ?site_list,
            merge = %policy,
            timeout_ms = timeout.map(|t| t.as_millis() as u64),
            "Federating query"
        );

        let mut aggregator = ResultAggregator::new(query_id, request, policy, site_list)
            .with_plugin_failures(plugin_failures);
        let deadline = timeout.map(|t| (Instant::now() + t, t));
        let mut dispatch = self.dispatcher.dispatch(targets);

        self.drain(&mut aggregator, &mut dispatch, deadline).await?;
        dispatch.cancel_all();
        let response = aggregator.close()?;

        info!(
            results = response.results.len(),
            hits = %response.hits,
            failed = response.processing_details.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Federated query complete"
        );

        let response = self.plugins.run_post(response).await?;
        if let Some(metrics) = &self.metrics {
            metrics.observe_duration(started.elapsed());
        }
        Ok(response)
    }

    /// Feed outcomes to the aggregator until every source is accounted for
    /// or the deadline passes.
    async fn drain(
        &self,
        aggregator: &mut ResultAggregator,
        dispatch: &mut Dispatch,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<(), FederationError> {
        while aggregator.outstanding() > 0 {
            let next = match deadline {
                Some((deadline, timeout)) => {
                    match tokio::time::timeout_at(deadline, dispatch.next_outcome()).await {
                        Ok(next) => next,
                        Err(_) => {
                            let abandoned = aggregator.abandon(timeout)?;
                            for source_id in &abandoned {
                                warn!(source_id = %source_id, "Source did not answer before the deadline");
                                self.observe("timeout");
                            }
                            return Ok(());
                        }
                    }
                }
                None => dispatch.next_outcome().await,
            };

            match next {
                Some(done) => {
                    log_outcome(&done.source_id, &done.outcome);
                    self.observe(done.outcome.label());
                    aggregator.accept(done.index, done.outcome)?;
                }
                None => {
                    let lost = aggregator.interrupt_outstanding("query task ended without reporting")?;
                    for source_id in &lost {
                        warn!(source_id = %source_id, "Source query task was torn down");
                        self.observe("interrupted");
                    }
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn observe(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.observe_outcome(outcome);
        }
    }

    fn validate(&self, query: &Query) -> Result<(), FederationError> {
        if query.start_index() == 0 {
            return Err(FederationError::InvalidQuery(
                "start index is 1-based".to_string(),
            ));
        }
        if query.start_index() > self.config.max_start_index {
            return Err(FederationError::InvalidQuery(format!(
                "start index {} exceeds the maximum of {}",
                query.start_index(),
                self.config.max_start_index
            )));
        }
        Ok(())
    }

    fn with_default_timeout(&self, request: QueryRequest) -> QueryRequest {
        match (request.query.timeout(), self.config.default_timeout()) {
            (None, Some(default)) => {
                let query = request.query.with_timeout(default);
                request.with_query(query)
            }
            _ => request,
        }
    }
}

/// Deduplicate by id, keeping selection order.
fn select_sources(sources: &[Arc<dyn Source>]) -> Result<Vec<Arc<dyn Source>>, FederationError> {
    if sources.is_empty() {
        return Err(FederationError::NoSources);
    }

    let mut seen = HashSet::new();
    Ok(sources
        .iter()
        .filter(|source| {
            let first = seen.insert(source.id().to_string());
            if !first {
                debug!(source_id = source.id(), "Ignoring duplicate source in selection");
            }
            first
        })
        .cloned()
        .collect())
}

/// Every source is asked for results from index 1 up to the last index the
/// caller wants; the global offset is applied after merging.
fn paged_for_sources(query: &Query) -> Query {
    let rewritten = query.with_start_index(1);
    if query.page_size() == 0 {
        return rewritten;
    }
    let through = query
        .start_index()
        .saturating_sub(1)
        .saturating_add(query.page_size());
    rewritten.with_page_size(through)
}

fn log_outcome(source_id: &str, outcome: &TaskOutcome) {
    match outcome {
        TaskOutcome::Success { response, elapsed } => debug!(
            source_id,
            returned = response.results.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Source answered"
        ),
        TaskOutcome::Error { error, elapsed } => warn!(
            source_id,
            error = %error,
            elapsed_ms = elapsed.as_millis() as u64,
            "Source query failed"
        ),
        TaskOutcome::Timeout { waited, .. } => warn!(
            source_id,
            waited_ms = waited.as_millis() as u64,
            "Source query timed out"
        ),
        TaskOutcome::Interrupted { reason } => warn!(
            source_id,
            reason = %reason,
            "Source query interrupted"
        ),
    }
}
