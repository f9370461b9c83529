// SPDX-License-Identifier: PMPL-1.0-or-later
//! Shared fixtures for federation tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use catfed_core::{Metacard, QueryRequest, ResultRecord, Source, SourceError, SourceResponse};

/// Configurable in-memory source.
///
/// Honours the requested page size the way a well-behaved catalog would, and
/// counts how often it was asked.
pub struct MockSource {
    id: String,
    latency: Duration,
    records: Vec<ResultRecord>,
    hits: i64,
    failure: Option<SourceError>,
    panics: bool,
    available: bool,
    calls: AtomicUsize,
    requests: Mutex<Vec<QueryRequest>>,
}

impl MockSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            latency: Duration::ZERO,
            records: Vec::new(),
            hits: -1,
            failure: None,
            panics: false,
            available: true,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// One record per score, named `{id}-{score}`, hits set to the count.
    pub fn with_scores(mut self, scores: &[f64]) -> Self {
        self.records = scores
            .iter()
            .map(|score| {
                ResultRecord::new(Metacard::new(format!("{}-{}", self.id, score), &self.id))
                    .with_relevance(*score)
            })
            .collect();
        self.hits = scores.len() as i64;
        self
    }

    pub fn with_records(mut self, records: Vec<ResultRecord>) -> Self {
        self.records = records;
        self
    }

    pub fn with_hits(mut self, hits: i64) -> Self {
        self.hits = hits;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing(mut self, error: SourceError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    pub fn offline(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<QueryRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn query(&self, request: &QueryRequest) -> Result<SourceResponse, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.panics {
            panic!("{} adapter crashed", self.id);
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let page = request.query.page_size() as usize;
        let records = if page > 0 {
            self.records.iter().take(page).cloned().collect()
        } else {
            self.records.clone()
        };
        Ok(SourceResponse::new(records, self.hits))
    }
}

/// Erase a list of mocks into the form `federate` takes.
pub fn as_sources(mocks: &[Arc<MockSource>]) -> Vec<Arc<dyn Source>> {
    mocks
        .iter()
        .map(|m| Arc::clone(m) as Arc<dyn Source>)
        .collect()
}

pub fn ids(records: &[ResultRecord]) -> Vec<String> {
    records.iter().map(|r| r.metacard.id.clone()).collect()
}
