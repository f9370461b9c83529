// SPDX-License-Identifier: PMPL-1.0-or-later
//! Federation endpoints
//!
//! A registry of catalog sources plus the query endpoint that federates over
//! a pattern-selected subset of them.
//!
//! ## Source selection
//!
//! The `sources` pattern of a query request is matched against the id each
//! source reports (its mask, when one is set):
//!
//! - `*` selects every registered source.
//! - `prefix/*` selects every id under `prefix/`.
//! - anything else selects the source with exactly that id.
//!
//! Selected sources are federated in id order. Reported ids are unique
//! across the registry, so a mask never shadows another source.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{error, info, instrument};

use catfed_core::{
    MaskedSource, PostFederatedQueryPlugin, PreFederatedQueryPlugin, Query, QueryRequest,
    QueryResponse, Source,
};
use catfed_federation::{FederationConfig, FederationMetrics, FederationStrategy, MergePolicyKind};

use crate::http_source::{build_client, HttpSource};
use crate::ApiError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A source known to this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredSource {
    /// Registry key.
    pub source_id: String,
    /// Id reported in responses instead of `source_id`.
    pub mask_id: Option<String>,
    /// Remote endpoint; `None` for in-process sources.
    pub endpoint: Option<String>,
    pub description: Option<String>,
    pub registered_at: DateTime<Utc>,
}

impl RegisteredSource {
    /// The id this source answers under.
    pub fn reported_id(&self) -> &str {
        self.mask_id.as_deref().unwrap_or(&self.source_id)
    }
}

/// Registration request for an HTTP-backed source.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterSourceRequest {
    pub source_id: String,
    pub endpoint: String,
    pub mask_id: Option<String>,
    pub description: Option<String>,
}

/// A federated query request.
#[derive(Debug, Serialize, Deserialize)]
pub struct FederationQueryRequest {
    /// Pattern selecting sources (`*`, `prefix/*`, or an exact id).
    #[serde(default = "all_sources")]
    pub sources: String,
    #[serde(default)]
    pub policy: MergePolicyKind,
    pub query: Query,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

fn all_sources() -> String {
    "*".to_string()
}

#[derive(Clone)]
struct SourceEntry {
    info: RegisteredSource,
    source: Arc<dyn Source>,
}

// ---------------------------------------------------------------------------
// Federation State
// ---------------------------------------------------------------------------

/// Source registry and the strategies that federate over it.
///
/// Both strategies share one worker pool, so the concurrency limit holds
/// across FIFO and sorted queries together.
#[derive(Clone)]
pub struct FederationState {
    sources: Arc<RwLock<BTreeMap<String, SourceEntry>>>,
    sorted: FederationStrategy,
    fifo: FederationStrategy,
    client: reqwest::Client,
}

impl FederationState {
    pub fn new(
        config: FederationConfig,
        metrics: Option<FederationMetrics>,
    ) -> Result<Self, ApiError> {
        let mut sorted = FederationStrategy::new(MergePolicyKind::Sorted, config.clone())?;
        let mut fifo =
            FederationStrategy::new(MergePolicyKind::Fifo, config)?.with_pool(sorted.pool().clone());
        if let Some(metrics) = metrics {
            sorted = sorted.with_metrics(metrics.clone());
            fifo = fifo.with_metrics(metrics);
        }

        Ok(Self {
            sources: Arc::new(RwLock::new(BTreeMap::new())),
            sorted,
            fifo,
            client: build_client()?,
        })
    }

    pub fn with_pre_plugin(mut self, plugin: Arc<dyn PreFederatedQueryPlugin>) -> Self {
        self.sorted = self.sorted.with_pre_plugin(Arc::clone(&plugin));
        self.fifo = self.fifo.with_pre_plugin(plugin);
        self
    }

    pub fn with_post_plugin(mut self, plugin: Arc<dyn PostFederatedQueryPlugin>) -> Self {
        self.sorted = self.sorted.with_post_plugin(Arc::clone(&plugin));
        self.fifo = self.fifo.with_post_plugin(plugin);
        self
    }

    pub fn strategy(&self, kind: MergePolicyKind) -> &FederationStrategy {
        match kind {
            MergePolicyKind::Sorted => &self.sorted,
            MergePolicyKind::Fifo => &self.fifo,
        }
    }

    /// Register an in-process source under its own id.
    pub fn register(
        &self,
        source: Arc<dyn Source>,
        description: Option<String>,
    ) -> Result<RegisteredSource, ApiError> {
        let info = RegisteredSource {
            source_id: source.id().to_string(),
            mask_id: None,
            endpoint: None,
            description,
            registered_at: Utc::now(),
        };
        self.insert(info, source)
    }

    /// Register a remote source reached over HTTP.
    pub fn register_http(&self, request: RegisterSourceRequest) -> Result<RegisteredSource, ApiError> {
        if !valid_source_id(&request.source_id) {
            return Err(ApiError::BadRequest(format!(
                "invalid source id '{}'",
                request.source_id
            )));
        }
        if let Some(mask) = &request.mask_id {
            if !valid_source_id(mask) {
                return Err(ApiError::BadRequest(format!("invalid mask id '{}'", mask)));
            }
        }
        if !(request.endpoint.starts_with("http://") || request.endpoint.starts_with("https://")) {
            return Err(ApiError::BadRequest(format!(
                "endpoint '{}' is not an http(s) URL",
                request.endpoint
            )));
        }

        let http = HttpSource::new(&request.source_id, &request.endpoint, self.client.clone());
        let source: Arc<dyn Source> = match &request.mask_id {
            Some(mask) => Arc::new(MaskedSource::new(http, mask.clone())),
            None => Arc::new(http),
        };

        let info = RegisteredSource {
            source_id: request.source_id,
            mask_id: request.mask_id,
            endpoint: Some(request.endpoint),
            description: request.description,
            registered_at: Utc::now(),
        };
        self.insert(info, source)
    }

    fn insert(&self, info: RegisteredSource, source: Arc<dyn Source>) -> Result<RegisteredSource, ApiError> {
        let mut sources = self.write()?;
        if sources.contains_key(&info.source_id) {
            return Err(ApiError::Conflict(format!(
                "source '{}' is already registered",
                info.source_id
            )));
        }
        if let Some(existing) = sources
            .values()
            .find(|e| e.info.reported_id() == info.reported_id())
        {
            return Err(ApiError::Conflict(format!(
                "source '{}' already reports as '{}'",
                existing.info.source_id,
                info.reported_id()
            )));
        }
        info!(source_id = %info.source_id, reported_id = %info.reported_id(), "Registered source");
        sources.insert(
            info.source_id.clone(),
            SourceEntry {
                info: info.clone(),
                source,
            },
        );
        Ok(info)
    }

    /// Returns whether a source was removed.
    pub fn deregister(&self, source_id: &str) -> Result<bool, ApiError> {
        let removed = self.write()?.remove(source_id).is_some();
        if removed {
            info!(source_id = %source_id, "Deregistered source");
        }
        Ok(removed)
    }

    pub fn list(&self) -> Result<Vec<RegisteredSource>, ApiError> {
        Ok(self.read()?.values().map(|e| e.info.clone()).collect())
    }

    pub fn source_count(&self) -> usize {
        self.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Sources whose reported id matches `pattern`, in id order.
    pub fn select(&self, pattern: &str) -> Result<Vec<Arc<dyn Source>>, ApiError> {
        Ok(self
            .read()?
            .values()
            .filter(|e| pattern_matches(pattern, e.info.reported_id()))
            .map(|e| Arc::clone(&e.source))
            .collect())
    }

    /// Run a federated query over the sources selected by `request.sources`.
    pub async fn query(&self, request: FederationQueryRequest) -> Result<QueryResponse, ApiError> {
        let sources = self.select(&request.sources)?;
        let query_request = QueryRequest {
            query: request.query,
            properties: request.properties,
        };
        let response = self
            .strategy(request.policy)
            .federate(&sources, query_request)
            .await?;
        Ok(response)
    }

    /// Whether the shared worker pool still accepts source queries.
    pub fn is_accepting(&self) -> bool {
        !self.sorted.pool().is_shut_down()
    }

    pub fn shutdown(&self) {
        self.sorted.pool().shutdown();
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, SourceEntry>>, ApiError> {
        self.sources.read().map_err(|_| {
            error!("Source registry RwLock poisoned");
            ApiError::Internal("source registry unavailable".to_string())
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, SourceEntry>>, ApiError> {
        self.sources.write().map_err(|_| {
            error!("Source registry RwLock poisoned");
            ApiError::Internal("source registry unavailable".to_string())
        })
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build federation API routes.
pub fn federation_router(state: FederationState) -> Router {
    Router::new()
        .route("/federation/sources", get(list_sources).post(register_source))
        .route("/federation/sources/{*source_id}", delete(deregister_source))
        .route("/federation/query", post(federation_query))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// List all registered sources.
#[instrument(skip(state))]
async fn list_sources(
    State(state): State<FederationState>,
) -> Result<Json<Vec<RegisteredSource>>, ApiError> {
    Ok(Json(state.list()?))
}

/// Register an HTTP-backed source.
#[instrument(skip(state, request), fields(source_id = %request.source_id))]
async fn register_source(
    State(state): State<FederationState>,
    Json(request): Json<RegisterSourceRequest>,
) -> Result<(StatusCode, Json<RegisteredSource>), ApiError> {
    let registered = state.register_http(request)?;
    Ok((StatusCode::CREATED, Json(registered)))
}

/// Remove a source from the registry.
#[instrument(skip(state))]
async fn deregister_source(
    State(state): State<FederationState>,
    Path(source_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.deregister(&source_id)? {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::NotFound(format!("source '{}' is not registered", source_id)))
    }
}

/// Execute a federated query across matching sources.
#[instrument(skip(state, request), fields(sources = %request.sources, policy = %request.policy))]
async fn federation_query(
    State(state): State<FederationState>,
    Json(request): Json<FederationQueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    Ok(Json(state.query(request).await?))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Match a selection pattern against a source id.
/// `"archives/*"` matches `"archives/maritime"` but not `"archives-old/x"`.
fn pattern_matches(pattern: &str, source_id: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    match pattern.strip_suffix('*') {
        Some(prefix) if prefix.ends_with('/') => source_id.starts_with(prefix),
        _ => pattern == source_id,
    }
}

/// Alphanumeric plus `-`, `_` and `/`, at most 128 characters.
fn valid_source_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '/')
}
