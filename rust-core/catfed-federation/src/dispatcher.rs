// SPDX-License-Identifier: PMPL-1.0-or-later
//! Per-source query dispatch.
//!
//! [`Dispatcher::dispatch`] launches one task per target on the worker pool
//! and returns immediately. Every target produces exactly one
//! [`CompletedTask`] on the dispatch's outcome channel: success, error
//! (including pool rejection and adapter panics), or interruption. Nothing a
//! source does propagates past its task.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use catfed_core::{QueryRequest, Source, SourceError, SourceResponse};

use crate::pool::{Admission, WorkerPool};

/// How one source's query ended.
#[derive(Debug)]
pub enum TaskOutcome {
    Success {
        response: SourceResponse,
        elapsed: Duration,
    },
    Error {
        error: SourceError,
        elapsed: Duration,
    },
    /// The shared deadline passed first. `interrupted` records that the
    /// task was asked to cancel.
    Timeout { waited: Duration, interrupted: bool },
    /// The task ended without running the query to completion.
    Interrupted { reason: String },
}

impl TaskOutcome {
    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Success { .. } => "success",
            TaskOutcome::Error { .. } => "error",
            TaskOutcome::Timeout { .. } => "timeout",
            TaskOutcome::Interrupted { .. } => "interrupted",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success { .. })
    }
}

/// An outcome tagged with the source it belongs to.
#[derive(Debug)]
pub struct CompletedTask {
    /// Position of the source in the selection.
    pub index: usize,
    pub source_id: String,
    pub outcome: TaskOutcome,
}

/// One source and the request it should receive.
pub struct DispatchTarget {
    pub source: Arc<dyn Source>,
    pub request: QueryRequest,
}

/// Handle on one dispatched source query.
#[derive(Debug)]
pub struct SourceHandle {
    index: usize,
    source_id: String,
    /// `None` when the pool rejected the task.
    join: Option<JoinHandle<()>>,
}

impl SourceHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn was_rejected(&self) -> bool {
        self.join.is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Best-effort cancellation; the adapter stops at its next await point.
    pub fn cancel(&self) {
        if let Some(join) = &self.join {
            join.abort();
        }
    }
}

/// All tasks of one dispatch plus the channel their outcomes arrive on.
///
/// Dropping a `Dispatch` cancels any task still running.
pub struct Dispatch {
    handles: Vec<SourceHandle>,
    outcomes: mpsc::Receiver<CompletedTask>,
}

impl Dispatch {
    pub fn handles(&self) -> &[SourceHandle] {
        &self.handles
    }

    pub fn handle(&self, source_id: &str) -> Option<&SourceHandle> {
        self.handles.iter().find(|h| h.source_id == source_id)
    }

    /// Next outcome in completion order. `None` once every task has reported
    /// or been torn down.
    pub async fn next_outcome(&mut self) -> Option<CompletedTask> {
        self.outcomes.recv().await
    }

    pub fn cancel_all(&self) {
        for handle in &self.handles {
            handle.cancel();
        }
    }
}

impl Drop for Dispatch {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Launches source queries onto a shared [`WorkerPool`].
#[derive(Clone, Debug)]
pub struct Dispatcher {
    pool: WorkerPool,
}

impl Dispatcher {
    pub fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Submit one task per target. Never blocks and never fails: a rejected
    /// submission is reported as that source's error outcome.
    pub fn dispatch(&self, targets: Vec<DispatchTarget>) -> Dispatch {
        let (tx, rx) = mpsc::channel(targets.len().max(1));
        let mut handles = Vec::with_capacity(targets.len());

        for (index, target) in targets.into_iter().enumerate() {
            let source_id = target.source.id().to_string();

            let join = match self.pool.admit() {
                Ok(admission) => Some(tokio::spawn(run_task(
                    index,
                    source_id.clone(),
                    target,
                    admission,
                    tx.clone(),
                ))),
                Err(error) => {
                    warn!(source_id = %source_id, error = %error, "Source query rejected");
                    // Capacity equals the number of targets, so this cannot fill up.
                    let _ = tx.try_send(CompletedTask {
                        index,
                        source_id: source_id.clone(),
                        outcome: TaskOutcome::Error {
                            error,
                            elapsed: Duration::ZERO,
                        },
                    });
                    None
                }
            };

            handles.push(SourceHandle {
                index,
                source_id,
                join,
            });
        }

        Dispatch {
            handles,
            outcomes: rx,
        }
    }
}

async fn run_task(
    index: usize,
    source_id: String,
    target: DispatchTarget,
    admission: Admission,
    tx: mpsc::Sender<CompletedTask>,
) {
    let _permit = match admission {
        Admission::Running(permit) => permit,
        Admission::Queued(ticket) => match ticket.wait().await {
            Some(permit) => permit,
            None => {
                let _ = tx
                    .send(CompletedTask {
                        index,
                        source_id,
                        outcome: TaskOutcome::Interrupted {
                            reason: "worker pool shut down before the query started".to_string(),
                        },
                    })
                    .await;
                return;
            }
        },
    };

    let outcome = query_source(target.source.as_ref(), &target.request).await;
    debug!(source_id = %source_id, outcome = outcome.label(), "Source query finished");

    // The receiver is gone when the federation already gave up on us.
    let _ = tx
        .send(CompletedTask {
            index,
            source_id,
            outcome,
        })
        .await;
}

/// Run one query, timing it and converting every failure into an outcome.
pub async fn query_source(source: &dyn Source, request: &QueryRequest) -> TaskOutcome {
    let started = Instant::now();

    if !source.is_available() {
        return TaskOutcome::Error {
            error: SourceError::Unavailable(format!("{} is not available", source.id())),
            elapsed: started.elapsed(),
        };
    }

    let result = AssertUnwindSafe(source.query(request)).catch_unwind().await;
    let elapsed = started.elapsed();

    match result {
        Ok(Ok(response)) => TaskOutcome::Success { response, elapsed },
        Ok(Err(error)) => TaskOutcome::Error { error, elapsed },
        Err(payload) => TaskOutcome::Error {
            error: SourceError::Panicked(panic_message(payload.as_ref())),
            elapsed,
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
