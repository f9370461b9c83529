// SPDX-License-Identifier: PMPL-1.0-or-later
//! Prometheus instrumentation for federation.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::time::Duration;

use crate::error::FederationError;

/// Counters and timings shared by every federation of a strategy.
#[derive(Clone, Debug)]
pub struct FederationMetrics {
    federations: IntCounter,
    source_outcomes: IntCounterVec,
    duration: Histogram,
}

impl FederationMetrics {
    /// Create the metrics and register them on `registry`.
    pub fn register(registry: &Registry) -> Result<Self, FederationError> {
        let federations = IntCounter::new(
            "catfed_federations_total",
            "Number of federated queries started",
        )?;
        let source_outcomes = IntCounterVec::new(
            Opts::new(
                "catfed_source_outcomes_total",
                "Source query outcomes by kind",
            ),
            &["outcome"],
        )?;
        let duration = Histogram::with_opts(HistogramOpts::new(
            "catfed_federation_duration_seconds",
            "Wall-clock duration of federated queries",
        ))?;

        registry.register(Box::new(federations.clone()))?;
        registry.register(Box::new(source_outcomes.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            federations,
            source_outcomes,
            duration,
        })
    }

    pub(crate) fn federation_started(&self) {
        self.federations.inc();
    }

    pub(crate) fn observe_outcome(&self, outcome: &str) {
        self.source_outcomes.with_label_values(&[outcome]).inc();
    }

    pub(crate) fn observe_duration(&self, elapsed: Duration) {
        self.duration.observe(elapsed.as_secs_f64());
    }

    pub fn federations(&self) -> u64 {
        self.federations.get()
    }

    pub fn outcomes(&self, outcome: &str) -> u64 {
        self.source_outcomes.with_label_values(&[outcome]).get()
    }
}
