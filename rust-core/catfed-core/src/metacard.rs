// SPDX-License-Identifier: PMPL-1.0-or-later
//! Metacards and scored result records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A metadata record as returned by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metacard {
    /// Identifier within the originating source.
    pub id: String,
    /// Source that produced this record. Stamped by the adapter when the
    /// remote end leaves it out.
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// When the described resource became effective.
    #[serde(default)]
    pub effective: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    /// Remaining attributes, opaque to federation.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Metacard {
    pub fn new(id: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            title: None,
            effective: None,
            modified: None,
            created: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_effective(mut self, at: DateTime<Utc>) -> Self {
        self.effective = Some(at);
        self
    }

    pub fn with_modified(mut self, at: DateTime<Utc>) -> Self {
        self.modified = Some(at);
        self
    }

    pub fn with_created(mut self, at: DateTime<Utc>) -> Self {
        self.created = Some(at);
        self
    }
}

/// One result: a metacard plus the scores comparators order by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub metacard: Metacard,
    /// Relevance assigned by the source; higher is more relevant.
    #[serde(default)]
    pub relevance: Option<f64>,
    /// Distance from the query geometry in metres.
    #[serde(default)]
    pub distance_meters: Option<f64>,
}

impl ResultRecord {
    pub fn new(metacard: Metacard) -> Self {
        Self {
            metacard,
            relevance: None,
            distance_meters: None,
        }
    }

    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance = Some(score);
        self
    }

    pub fn with_distance(mut self, meters: f64) -> Self {
        self.distance_meters = Some(meters);
        self
    }

    pub fn source_id(&self) -> &str {
        &self.metacard.source_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_builder_sets_fields() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let record = ResultRecord::new(
            Metacard::new("mc-1", "csw-east")
                .with_title("Harbor survey")
                .with_effective(at),
        )
        .with_relevance(0.8);

        assert_eq!(record.source_id(), "csw-east");
        assert_eq!(record.metacard.title.as_deref(), Some("Harbor survey"));
        assert_eq!(record.metacard.effective, Some(at));
        assert_eq!(record.relevance, Some(0.8));
        assert!(record.distance_meters.is_none());
    }

    #[test]
    fn test_record_deserializes_sparse_json() {
        let record: ResultRecord = serde_json::from_str(
            r#"{"metacard": {"id": "a", "source_id": "wfs"}, "relevance": 2.5}"#,
        )
        .unwrap();
        assert_eq!(record.metacard.id, "a");
        assert_eq!(record.relevance, Some(2.5));
        assert!(record.metacard.attributes.is_empty());
    }
}
