// SPDX-License-Identifier: PMPL-1.0-or-later
//! catfed federation
//!
//! Dispatches one logical catalog query to many sources at once, collects
//! their answers as they arrive (or fail to), and merges them into a single
//! response.
//!
//! - [`comparator`]: relevance, distance and temporal orderings.
//! - [`pool`] / [`dispatcher`]: bounded per-source task launch.
//! - [`aggregator`]: the open/closing/closed result state machine.
//! - [`plugins`]: pre- and post-federation plugin chains.
//! - [`strategy`]: the orchestrator tying it together.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use catfed_core::{Query, QueryRequest, Source};
//! use catfed_federation::{FederationConfig, FederationStrategy};
//!
//! # async fn run(sources: Vec<Arc<dyn Source>>) -> Result<(), catfed_federation::FederationError> {
//! let strategy = FederationStrategy::sorted(FederationConfig::default())?;
//! let request = QueryRequest::new(Query::new("anyText LIKE 'harbor'").with_page_size(20));
//! let response = strategy.federate(&sources, request).await?;
//! for detail in &response.processing_details {
//!     eprintln!("{} failed: {}", detail.source_id, detail.message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod comparator;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod plugins;
pub mod pool;
pub mod strategy;

pub use aggregator::{AggregatorState, MergePolicy, ResultAggregator};
pub use comparator::{SortKey, SortPolicy, TemporalField};
pub use config::FederationConfig;
pub use dispatcher::{CompletedTask, Dispatch, DispatchTarget, Dispatcher, SourceHandle, TaskOutcome};
pub use error::FederationError;
pub use metrics::FederationMetrics;
pub use plugins::PluginChain;
pub use pool::WorkerPool;
pub use strategy::{FederationStrategy, MergePolicyKind};
