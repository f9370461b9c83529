// SPDX-License-Identifier: PMPL-1.0-or-later
//! Result ordering policies.
//!
//! The caller's free-text sort property is resolved exactly once, through
//! [`SORT_PROPERTIES`], into a [`SortPolicy`]. Everything downstream works
//! with the resolved value.
//!
//! Records lacking the compared value (or carrying a NaN score) always sort
//! after records that have one, whichever the direction. Equal keys compare
//! `Equal`; the merge step relies on a stable sort for tie order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use catfed_core::{ResultRecord, SortBy, SortDirection};

/// Which metacard timestamp a temporal sort uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalField {
    Effective,
    Modified,
    Created,
}

/// Property family a comparator orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Relevance,
    Distance,
    Temporal(TemporalField),
}

impl SortKey {
    /// Direction used when the caller names a property but no direction.
    pub fn default_direction(self) -> SortDirection {
        match self {
            SortKey::Relevance => SortDirection::Descending,
            SortKey::Distance => SortDirection::Ascending,
            SortKey::Temporal(_) => SortDirection::Descending,
        }
    }
}

/// Recognised sort properties, matched case-insensitively.
pub const SORT_PROPERTIES: &[(&str, SortKey)] = &[
    ("relevance", SortKey::Relevance),
    ("distance", SortKey::Distance),
    ("temporal", SortKey::Temporal(TemporalField::Effective)),
    ("effective", SortKey::Temporal(TemporalField::Effective)),
    ("modified", SortKey::Temporal(TemporalField::Modified)),
    ("created", SortKey::Temporal(TemporalField::Created)),
];

/// A total order over result records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortPolicy {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortPolicy {
    /// Relevance, most relevant first.
    fn default() -> Self {
        Self {
            key: SortKey::Relevance,
            direction: SortDirection::Descending,
        }
    }
}

impl SortPolicy {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    /// Resolve a requested sort. Absent or unrecognised properties yield the
    /// default policy.
    pub fn resolve(sort: Option<&SortBy>) -> Self {
        let Some(sort) = sort else {
            return Self::default();
        };

        SORT_PROPERTIES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(sort.property.trim()))
            .map(|&(_, key)| Self {
                key,
                direction: sort.direction.unwrap_or_else(|| key.default_direction()),
            })
            .unwrap_or_default()
    }

    pub fn compare(&self, a: &ResultRecord, b: &ResultRecord) -> Ordering {
        match self.key {
            SortKey::Relevance => compare_scores(a.relevance, b.relevance, self.direction),
            SortKey::Distance => compare_scores(a.distance_meters, b.distance_meters, self.direction),
            SortKey::Temporal(field) => {
                compare_present(timestamp(a, field), timestamp(b, field), self.direction)
            }
        }
    }

    /// Stable in-place sort.
    pub fn sort(&self, records: &mut [ResultRecord]) {
        records.sort_by(|a, b| self.compare(a, b));
    }
}

impl fmt::Display for SortPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self.key {
            SortKey::Relevance => "relevance",
            SortKey::Distance => "distance",
            SortKey::Temporal(TemporalField::Effective) => "effective",
            SortKey::Temporal(TemporalField::Modified) => "modified",
            SortKey::Temporal(TemporalField::Created) => "created",
        };
        write!(f, "{} {}", key, self.direction)
    }
}

fn timestamp(record: &ResultRecord, field: TemporalField) -> Option<DateTime<Utc>> {
    let card = &record.metacard;
    match field {
        TemporalField::Effective => card.effective,
        TemporalField::Modified => card.modified,
        TemporalField::Created => card.created,
    }
}

/// Scores compare with NaN treated as missing.
fn compare_scores(a: Option<f64>, b: Option<f64>, direction: SortDirection) -> Ordering {
    let a = a.filter(|v| !v.is_nan());
    let b = b.filter(|v| !v.is_nan());
    match (a, b) {
        (Some(x), Some(y)) => directed(x.total_cmp(&y), direction),
        (a, b) => missing_last(a.is_some(), b.is_some()),
    }
}

fn compare_present<T: Ord>(a: Option<T>, b: Option<T>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => directed(x.cmp(&y), direction),
        (a, b) => missing_last(a.is_some(), b.is_some()),
    }
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

fn missing_last(a_present: bool, b_present: bool) -> Ordering {
    match (a_present, b_present) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
