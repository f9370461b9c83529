// SPDX-License-Identifier: PMPL-1.0-or-later
//! catfed API server binary
//!
//! Starts the HTTP API server for federated catalog queries.

use catfed_api::{AppState, ApiConfig};
use catfed_federation::FederationConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if std::env::var("CATFED_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    catfed_api::install_crypto_provider();

    let config = ApiConfig::from_env();
    let federation = FederationConfig::from_env();
    federation.validate()?;

    tracing::info!(
        max_concurrent = federation.max_concurrent_queries,
        max_queued = federation.max_queued_queries,
        default_timeout_ms = federation.default_timeout_ms,
        "Starting catfed API server on {}:{}",
        config.host,
        config.port
    );

    let state = AppState::new(config, federation)?;
    catfed_api::serve(state).await?;

    Ok(())
}
