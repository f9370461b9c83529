// SPDX-License-Identifier: PMPL-1.0-or-later
//! Federation error types.
//!
//! Source failures never show up here: they are data in the response. These
//! are the conditions that stop a federation outright, plus the programming
//! errors the aggregator refuses to paper over.

use thiserror::Error;

/// Errors returned by the federation engine.
#[derive(Error, Debug)]
pub enum FederationError {
    #[error("no sources selected for federation")]
    NoSources,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("federation stopped by plugin {plugin}: {message}")]
    StopProcessing { plugin: String, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("response is already closed")]
    ResponseClosed,

    #[error("source index {0} is not part of this federation")]
    UnknownSource(usize),

    #[error("outcome for source {0} was already recorded")]
    DuplicateOutcome(String),

    #[error("{0} sources are still outstanding")]
    SourcesOutstanding(usize),

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}
