// SPDX-License-Identifier: PMPL-1.0-or-later
//! catfed API
//!
//! HTTP API server for federated catalog queries.
//! Sources are registered at runtime and queried through a single endpoint;
//! health, readiness and Prometheus metrics are served alongside.

pub mod federation;
pub mod http_source;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};

use catfed_federation::{FederationConfig, FederationError, FederationMetrics};

pub use federation::{
    federation_router, FederationQueryRequest, FederationState, RegisterSourceRequest,
    RegisteredSource,
};
pub use http_source::HttpSource;

/// API errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<FederationError> for ApiError {
    fn from(err: FederationError) -> Self {
        match err {
            FederationError::NoSources => ApiError::NotFound(err.to_string()),
            FederationError::InvalidQuery(_) => ApiError::BadRequest(err.to_string()),
            FederationError::StopProcessing { .. } => ApiError::Forbidden(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse {
            error: message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Prefix for the federation routes
    pub version_prefix: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8181,
            version_prefix: "/api/v1".to_string(),
        }
    }
}

impl ApiConfig {
    /// Defaults overlaid with `CATFED_HOST` and `CATFED_PORT`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(host) = lookup("CATFED_HOST").filter(|h| !h.trim().is_empty()) {
            config.host = host.trim().to_string();
        }
        if let Some(raw) = lookup("CATFED_PORT") {
            match u16::from_str(raw.trim()) {
                Ok(port) => config.port = port,
                Err(_) => warn!(variable = "CATFED_PORT", value = %raw, "Ignoring malformed configuration value"),
            }
        }
        config
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub registered_sources: usize,
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub start_time: std::time::Instant,
    pub config: ApiConfig,
    pub federation: FederationState,
    pub registry: Registry,
}

impl AppState {
    /// Build the shared state, registering federation metrics on a fresh
    /// registry.
    pub fn new(config: ApiConfig, federation: FederationConfig) -> Result<Self, ApiError> {
        let registry = Registry::new();
        let metrics = FederationMetrics::register(&registry)?;
        let federation = FederationState::new(federation, Some(metrics))?;
        Ok(Self {
            start_time: std::time::Instant::now(),
            config,
            federation,
            registry,
        })
    }

    /// Replace the federation state, e.g. to install plugins.
    pub fn with_federation(mut self, federation: FederationState) -> Self {
        self.federation = federation;
        self
    }
}

/// Build the API router
pub fn build_router(state: AppState) -> Router {
    let federation = federation_router(state.federation.clone());
    let prefix = state.config.version_prefix.trim_end_matches('/').to_string();

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    if prefix.is_empty() {
        app.merge(federation)
    } else {
        app.nest(&prefix, federation)
    }
}

/// Health check handler
#[instrument(skip(state))]
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        registered_sources: state.federation.source_count(),
    })
}

/// Ready while the worker pool accepts source queries.
#[instrument(skip(state))]
async fn ready_handler(State(state): State<AppState>) -> StatusCode {
    if state.federation.is_accepting() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&state.registry.gather(), &mut buffer)
        .map_err(|e| {
            error!(error = %e, "Failed to encode metrics");
            ApiError::Internal(e.to_string())
        })?;

    Ok((
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        buffer,
    ))
}

/// Install the process-wide rustls crypto provider. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Start the API server
pub async fn serve(state: AppState) -> Result<(), std::io::Error> {
    let addr = state.config.bind_address();
    let federation = state.federation.clone();
    let app = build_router(state);

    info!("Starting catfed API server on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested, closing worker pool");
            federation.shutdown();
        })
        .await?;

    Ok(())
}
