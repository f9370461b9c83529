// SPDX-License-Identifier: PMPL-1.0-or-later
//! Source and federated response types.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Add;
use uuid::Uuid;

use crate::metacard::ResultRecord;
use crate::query::QueryRequest;

/// Total hit count, which a source may be unable to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HitCount {
    Known(u64),
    #[default]
    Unknown,
}

impl HitCount {
    /// Interpret a source-reported count where negative means unknown.
    pub fn from_reported(hits: i64) -> Self {
        u64::try_from(hits).map_or(HitCount::Unknown, HitCount::Known)
    }

    pub fn known(self) -> Option<u64> {
        match self {
            HitCount::Known(n) => Some(n),
            HitCount::Unknown => None,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, HitCount::Known(_))
    }
}

/// Unknown counts are skipped rather than poisoning the sum: the total is
/// only unknown when neither side knows.
impl Add for HitCount {
    type Output = HitCount;

    fn add(self, rhs: HitCount) -> HitCount {
        match (self, rhs) {
            (HitCount::Known(a), HitCount::Known(b)) => HitCount::Known(a.saturating_add(b)),
            (HitCount::Known(a), HitCount::Unknown) | (HitCount::Unknown, HitCount::Known(a)) => {
                HitCount::Known(a)
            }
            (HitCount::Unknown, HitCount::Unknown) => HitCount::Unknown,
        }
    }
}

impl fmt::Display for HitCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HitCount::Known(n) => write!(f, "{}", n),
            HitCount::Unknown => write!(f, "unknown"),
        }
    }
}

fn unknown_hits() -> i64 {
    -1
}

/// What one source returns for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResponse {
    pub results: Vec<ResultRecord>,
    /// Total matches at the source; negative when the source cannot tell.
    #[serde(default = "unknown_hits")]
    pub hits: i64,
    /// Source-specific properties, merged into the federated response.
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl SourceResponse {
    pub fn new(results: Vec<ResultRecord>, hits: i64) -> Self {
        Self {
            results,
            hits,
            properties: HashMap::new(),
        }
    }

    pub fn hit_count(&self) -> HitCount {
        HitCount::from_reported(self.hits)
    }
}

/// Why a source contributed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Error,
    Timeout,
    Interrupted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Error => write!(f, "error"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Per-source failure record attached to a federated response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingDetail {
    pub source_id: String,
    pub kind: FailureKind,
    pub message: String,
}

/// A recoverable plugin failure. The plugin step was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginFailure {
    pub plugin: String,
    /// Set for pre-query plugins, which run once per source.
    pub source_id: Option<String>,
    pub message: String,
}

/// Bookkeeping for a source that answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProperties {
    #[serde(rename = "TOTAL_HITS")]
    pub total_hits: HitCount,
    #[serde(rename = "TOTAL_RESULTS_RETURNED")]
    pub total_results_returned: usize,
    #[serde(rename = "ELAPSED_TIME")]
    pub elapsed_ms: u64,
    /// Properties the source attached to its own response.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// The merged answer to a federated query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query_id: Uuid,
    /// The request as the caller issued it, before per-source rewriting.
    pub request: QueryRequest,
    pub results: Vec<ResultRecord>,
    pub hits: HitCount,
    /// One entry per source that failed, timed out or was interrupted.
    pub processing_details: Vec<ProcessingDetail>,
    /// Keyed by source id, for sources that answered.
    #[serde(rename = "properties")]
    pub source_properties: BTreeMap<String, SourceProperties>,
    /// Every source the query was sent to, in selection order.
    #[serde(rename = "SITE_LIST")]
    pub site_list: Vec<String>,
    #[serde(default)]
    pub plugin_failures: Vec<PluginFailure>,
}

impl QueryResponse {
    pub fn processing_detail(&self, source_id: &str) -> Option<&ProcessingDetail> {
        self.processing_details
            .iter()
            .find(|d| d.source_id == source_id)
    }

    /// True when at least one queried source contributed nothing.
    pub fn is_partial(&self) -> bool {
        !self.processing_details.is_empty()
    }
}
