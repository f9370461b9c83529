// SPDX-License-Identifier: PMPL-1.0-or-later
//! Query and request types.
//!
//! A [`Query`] is immutable once built: every `with_*` method returns a new
//! value, so the same query can be handed to plugins and sources without any
//! of them observing another's rewrite.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[serde(alias = "asc")]
    Ascending,
    #[serde(alias = "desc")]
    Descending,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Ascending => write!(f, "ascending"),
            SortDirection::Descending => write!(f, "descending"),
        }
    }
}

/// Requested sort: a property name plus an optional direction.
///
/// The property is free text as supplied by the caller. It is resolved to a
/// concrete comparator by the federation engine; unknown properties fall back
/// to relevance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortBy {
    pub property: String,
    #[serde(default)]
    pub direction: Option<SortDirection>,
}

impl SortBy {
    pub fn new(property: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            property: property.into(),
            direction: Some(direction),
        }
    }
}

fn default_start_index() -> u32 {
    1
}

/// A catalog query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Filter expression, passed through to sources untouched.
    filter: String,
    /// 1-based index of the first result wanted.
    #[serde(default = "default_start_index")]
    start_index: u32,
    /// Maximum number of results. 0 means unbounded.
    #[serde(default)]
    page_size: u32,
    #[serde(default)]
    sort: Option<SortBy>,
    /// 0 means no timeout.
    #[serde(default)]
    timeout_ms: u64,
    /// Whether sources should compute a total hit count.
    #[serde(default)]
    requests_total_count: bool,
}

impl Query {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            start_index: 1,
            page_size: 0,
            sort: None,
            timeout_ms: 0,
            requests_total_count: false,
        }
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn start_index(&self) -> u32 {
        self.start_index
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn sort(&self) -> Option<&SortBy> {
        self.sort.as_ref()
    }

    /// Query timeout, `None` when the query may run indefinitely.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    pub fn requests_total_count(&self) -> bool {
        self.requests_total_count
    }

    pub fn with_start_index(&self, start_index: u32) -> Self {
        Self {
            start_index,
            ..self.clone()
        }
    }

    pub fn with_page_size(&self, page_size: u32) -> Self {
        Self {
            page_size,
            ..self.clone()
        }
    }

    pub fn with_sort(&self, sort: SortBy) -> Self {
        Self {
            sort: Some(sort),
            ..self.clone()
        }
    }

    /// A zero duration clears the timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            ..self.clone()
        }
    }

    pub fn with_total_count(&self, requests_total_count: bool) -> Self {
        Self {
            requests_total_count,
            ..self.clone()
        }
    }
}

/// A query plus free-form request properties (security subject, client
/// hints, ...) that plugins and sources may read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: Query,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl QueryRequest {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            properties: HashMap::new(),
        }
    }

    /// Same request properties around a different query.
    pub fn with_query(&self, query: Query) -> Self {
        Self {
            query,
            properties: self.properties.clone(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

impl From<Query> for QueryRequest {
    fn from(query: Query) -> Self {
        Self::new(query)
    }
}
