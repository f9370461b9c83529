// SPDX-License-Identifier: PMPL-1.0-or-later
//! Collaborator error types.
//!
//! [`SourceError`] is everything that can go wrong while one source answers
//! one query. It never escapes a federation: it is recorded against the
//! source as a processing detail. [`PluginError`] distinguishes a plugin that
//! merely failed (skip it) from one that vetoes the whole federation.

use thiserror::Error;

/// Failure of a single source query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The source cannot express the query (unsupported filter, sort, ...).
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    /// The source reported itself unavailable and was not queried.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// Network or protocol failure talking to the source.
    #[error("transport error: {0}")]
    Transport(String),

    /// The source answered with something that is not a valid response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The worker pool refused the query task.
    #[error("query rejected by worker pool: {0}")]
    Rejected(String),

    /// The source adapter panicked while answering.
    #[error("source adapter panicked: {0}")]
    Panicked(String),
}

/// Failure raised by a federated query plugin.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// Recoverable: the plugin step is skipped and the chain continues.
    #[error("plugin execution failed: {0}")]
    Execution(String),

    /// Fatal: the whole federation is abandoned and the caller sees the error.
    #[error("processing stopped: {0}")]
    StopProcessing(String),
}

impl PluginError {
    /// Whether this error aborts the federation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PluginError::StopProcessing(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_display() {
        let err = SourceError::UnsupportedQuery("spatial filter".to_string());
        assert_eq!(err.to_string(), "unsupported query: spatial filter");

        let err = SourceError::Rejected("queue full".to_string());
        assert!(err.to_string().contains("worker pool"));
    }

    #[test]
    fn test_plugin_error_fatality() {
        assert!(!PluginError::Execution("boom".to_string()).is_fatal());
        assert!(PluginError::StopProcessing("denied".to_string()).is_fatal());
    }
}
