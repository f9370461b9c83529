// SPDX-License-Identifier: PMPL-1.0-or-later
//! Result aggregation state machine.
//!
//! ```text
//!   Open ──(last outcome)──▶ Closing ──close()──▶ Closed
//!     │                                             ▲
//!     └──abandon() / interrupt_outstanding()────────┘ (via Closing)
//! ```
//!
//! The aggregator is owned by the single task draining a dispatch, so it
//! needs no locking. Outcomes are consumed exactly once; anything arriving
//! once the aggregator has left `Open` is refused.
//!
//! Merge policies:
//! - **Fifo**: records are appended in arrival order. Each source
//!   contributes at most `page_size` records.
//! - **Sorted**: batches are kept per source and, on close, concatenated in
//!   selection order, stably sorted and truncated. Arrival order never
//!   influences the result.
//!
//! In both cases the first `start_index - 1` records of the merged stream are
//! skipped, since every source was asked for results from index 1.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use catfed_core::{
    FailureKind, HitCount, PluginFailure, ProcessingDetail, QueryRequest, QueryResponse,
    ResultRecord, SourceProperties, SourceResponse,
};

use crate::comparator::SortPolicy;
use crate::dispatcher::TaskOutcome;
use crate::error::FederationError;

/// How source batches become one result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    Fifo,
    Sorted(SortPolicy),
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergePolicy::Fifo => write!(f, "fifo"),
            MergePolicy::Sorted(sort) => write!(f, "sorted by {}", sort),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    /// Sources are still outstanding.
    Open,
    /// Every source is accounted for; waiting for `close`.
    Closing,
    /// The response has been handed off.
    Closed,
}

pub struct ResultAggregator {
    query_id: Uuid,
    request: QueryRequest,
    policy: MergePolicy,
    state: AggregatorState,
    sources: Vec<String>,
    reported: Vec<bool>,
    outstanding: usize,
    /// Leading records still to drop for the start index (Fifo).
    skip: usize,
    offset: usize,
    page_size: usize,
    arrivals: Vec<ResultRecord>,
    batches: Vec<Vec<ResultRecord>>,
    hits: HitCount,
    failures: Vec<(usize, ProcessingDetail)>,
    source_properties: BTreeMap<String, SourceProperties>,
    plugin_failures: Vec<PluginFailure>,
}

impl ResultAggregator {
    /// `sources` are the selected source ids, in selection order. Outcomes
    /// are matched to them by index.
    pub fn new(
        query_id: Uuid,
        request: QueryRequest,
        policy: MergePolicy,
        sources: Vec<String>,
    ) -> Self {
        let offset = request.query.start_index().saturating_sub(1) as usize;
        let page_size = request.query.page_size() as usize;
        let outstanding = sources.len();

        Self {
            query_id,
            request,
            policy,
            state: if outstanding == 0 {
                AggregatorState::Closing
            } else {
                AggregatorState::Open
            },
            reported: vec![false; outstanding],
            batches: vec![Vec::new(); outstanding],
            sources,
            outstanding,
            skip: offset,
            offset,
            page_size,
            arrivals: Vec::new(),
            hits: HitCount::Unknown,
            failures: Vec::new(),
            source_properties: BTreeMap::new(),
            plugin_failures: Vec::new(),
        }
    }

    /// Attach plugin failures recorded before dispatch.
    pub fn with_plugin_failures(mut self, failures: Vec<PluginFailure>) -> Self {
        self.plugin_failures.extend(failures);
        self
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Consume one source outcome.
    pub fn accept(
        &mut self,
        index: usize,
        outcome: TaskOutcome,
    ) -> Result<AggregatorState, FederationError> {
        self.ensure_open()?;
        let source_id = self
            .sources
            .get(index)
            .cloned()
            .ok_or(FederationError::UnknownSource(index))?;
        if self.reported[index] {
            return Err(FederationError::DuplicateOutcome(source_id));
        }
        self.reported[index] = true;
        self.outstanding -= 1;

        match outcome {
            TaskOutcome::Success { response, elapsed } => {
                self.record_success(index, source_id, response, elapsed)
            }
            TaskOutcome::Error { error, .. } => {
                self.record_failure(index, source_id, FailureKind::Error, error.to_string())
            }
            TaskOutcome::Timeout {
                waited,
                interrupted,
            } => {
                let mut message = format!("no response within {}ms", waited.as_millis());
                if interrupted {
                    message.push_str("; query cancelled");
                }
                self.record_failure(index, source_id, FailureKind::Timeout, message)
            }
            TaskOutcome::Interrupted { reason } => {
                self.record_failure(index, source_id, FailureKind::Interrupted, reason)
            }
        }

        if self.outstanding == 0 {
            self.state = AggregatorState::Closing;
        }
        Ok(self.state)
    }

    /// The deadline passed: every outstanding source times out. Returns the
    /// ids of the abandoned sources.
    pub fn abandon(&mut self, waited: Duration) -> Result<Vec<String>, FederationError> {
        self.fail_outstanding(|| TaskOutcome::Timeout {
            waited,
            interrupted: true,
        })
    }

    /// Outstanding sources will never report (their tasks are gone).
    pub fn interrupt_outstanding(&mut self, reason: &str) -> Result<Vec<String>, FederationError> {
        self.fail_outstanding(|| TaskOutcome::Interrupted {
            reason: reason.to_string(),
        })
    }

    /// Perform the final merge and hand the response off. Only valid once
    /// every source is accounted for, and only once.
    pub fn close(&mut self) -> Result<QueryResponse, FederationError> {
        match self.state {
            AggregatorState::Open => {
                return Err(FederationError::SourcesOutstanding(self.outstanding))
            }
            AggregatorState::Closed => return Err(FederationError::ResponseClosed),
            AggregatorState::Closing => {}
        }

        let results = match self.policy {
            MergePolicy::Fifo => std::mem::take(&mut self.arrivals),
            MergePolicy::Sorted(sort) => {
                let mut merged: Vec<ResultRecord> =
                    self.batches.iter_mut().flat_map(std::mem::take).collect();
                sort.sort(&mut merged);
                let take = if self.page_size > 0 {
                    self.page_size
                } else {
                    usize::MAX
                };
                merged.into_iter().skip(self.offset).take(take).collect()
            }
        };

        let mut failures = std::mem::take(&mut self.failures);
        failures.sort_by_key(|(index, _)| *index);

        self.state = AggregatorState::Closed;
        Ok(QueryResponse {
            query_id: self.query_id,
            request: self.request.clone(),
            results,
            hits: self.hits,
            processing_details: failures.into_iter().map(|(_, detail)| detail).collect(),
            source_properties: std::mem::take(&mut self.source_properties),
            site_list: self.sources.clone(),
            plugin_failures: std::mem::take(&mut self.plugin_failures),
        })
    }

    fn ensure_open(&self) -> Result<(), FederationError> {
        match self.state {
            AggregatorState::Open => Ok(()),
            AggregatorState::Closing | AggregatorState::Closed => {
                Err(FederationError::ResponseClosed)
            }
        }
    }

    fn fail_outstanding(
        &mut self,
        outcome: impl Fn() -> TaskOutcome,
    ) -> Result<Vec<String>, FederationError> {
        self.ensure_open()?;
        let pending: Vec<usize> = (0..self.sources.len())
            .filter(|&i| !self.reported[i])
            .collect();

        let mut ids = Vec::with_capacity(pending.len());
        for index in pending {
            ids.push(self.sources[index].clone());
            self.accept(index, outcome())?;
        }
        Ok(ids)
    }

    fn record_success(
        &mut self,
        index: usize,
        source_id: String,
        response: SourceResponse,
        elapsed: Duration,
    ) {
        let hits = response.hit_count();
        let returned = response.results.len();
        debug!(
            source_id = %source_id,
            returned,
            hits = %hits,
            elapsed_ms = elapsed.as_millis() as u64,
            "Source results arrived"
        );

        self.hits = self.hits + hits;
        self.source_properties.insert(
            source_id,
            SourceProperties {
                total_hits: hits,
                total_results_returned: returned,
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                extra: response.properties,
            },
        );

        match self.policy {
            MergePolicy::Fifo => self.append_arrivals(response.results),
            MergePolicy::Sorted(_) => self.batches[index] = response.results,
        }
    }

    fn append_arrivals(&mut self, records: Vec<ResultRecord>) {
        let mut appended = 0;
        for record in records {
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if self.page_size > 0 && appended >= self.page_size {
                break;
            }
            self.arrivals.push(record);
            appended += 1;
        }
    }

    fn record_failure(&mut self, index: usize, source_id: String, kind: FailureKind, message: String) {
        self.failures.push((
            index,
            ProcessingDetail {
                source_id,
                kind,
                message,
            },
        ));
    }
}
