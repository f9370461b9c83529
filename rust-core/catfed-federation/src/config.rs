// SPDX-License-Identifier: PMPL-1.0-or-later
//! Federation configuration.
//!
//! Defaults:
//! - max_concurrent_queries: 64 source queries in flight
//! - max_queued_queries: 1024 waiting for a worker
//! - max_start_index: 50 000
//! - default_timeout_ms: 0 (queries without a timeout wait indefinitely)

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::FederationError;

/// Configuration for a federation strategy and its worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Source queries allowed to run at once across all federations.
    pub max_concurrent_queries: usize,
    /// Source queries allowed to wait for a worker before submissions are
    /// rejected.
    pub max_queued_queries: usize,
    /// Largest accepted 1-based start index.
    pub max_start_index: u32,
    /// Applied to queries that carry no timeout of their own. 0 disables.
    pub default_timeout_ms: u64,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: 64,
            max_queued_queries: 1024,
            max_start_index: 50_000,
            default_timeout_ms: 0,
        }
    }
}

impl FederationConfig {
    /// Defaults overlaid with `CATFED_*` environment variables.
    ///
    /// - `CATFED_MAX_CONCURRENT_QUERIES`
    /// - `CATFED_MAX_QUEUED_QUERIES`
    /// - `CATFED_MAX_START_INDEX`
    /// - `CATFED_DEFAULT_TIMEOUT_MS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        overlay(&lookup, "CATFED_MAX_CONCURRENT_QUERIES", &mut config.max_concurrent_queries);
        overlay(&lookup, "CATFED_MAX_QUEUED_QUERIES", &mut config.max_queued_queries);
        overlay(&lookup, "CATFED_MAX_START_INDEX", &mut config.max_start_index);
        overlay(&lookup, "CATFED_DEFAULT_TIMEOUT_MS", &mut config.default_timeout_ms);
        config
    }

    pub fn validate(&self) -> Result<(), FederationError> {
        if self.max_concurrent_queries == 0 {
            return Err(FederationError::InvalidConfig(
                "max_concurrent_queries must be at least 1".to_string(),
            ));
        }
        if self.max_start_index == 0 {
            return Err(FederationError::InvalidConfig(
                "max_start_index must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        (self.default_timeout_ms > 0).then(|| Duration::from_millis(self.default_timeout_ms))
    }
}

fn overlay<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => warn!(variable = key, value = %raw, "Ignoring malformed configuration value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = FederationConfig::default();
        assert_eq!(config.max_concurrent_queries, 64);
        assert_eq!(config.max_queued_queries, 1024);
        assert_eq!(config.max_start_index, 50_000);
        assert!(config.default_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lookup_overlay_and_malformed_values() {
        let vars: HashMap<&str, &str> = [
            ("CATFED_MAX_CONCURRENT_QUERIES", "8"),
            ("CATFED_MAX_QUEUED_QUERIES", "not-a-number"),
            ("CATFED_DEFAULT_TIMEOUT_MS", " 2500 "),
        ]
        .into_iter()
        .collect();

        let config = FederationConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.max_concurrent_queries, 8);
        assert_eq!(config.max_queued_queries, 1024);
        assert_eq!(config.default_timeout(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = FederationConfig {
            max_concurrent_queries: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FederationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = FederationConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: FederationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_start_index, config.max_start_index);
    }
}
