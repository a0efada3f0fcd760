//! Fetch worker pool and admission path
//!
//! Admitted ids flow through one bounded queue to a fixed set of workers.
//! When the queue is full [`Admission::submit`] waits, which is what pushes
//! back on ingest callers.

use chrono::Utc;
use objwatch_common::types::{ObjectDetail, ObjectId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

use super::errors::{ErrorReporter, PipelineError};
use super::fetcher::{DetailFetcher, FetchError};
use super::identifiers::IdentifierSet;
use super::stats::{add, bump, PipelineStats};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("pipeline is shutting down")]
    ShuttingDown,
}

/// Outcome of one submitted batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdmissionReport {
    pub received: usize,
    pub admitted: usize,
    pub duplicates: usize,
}

/// Cloneable entry point into the worker pool
#[derive(Debug, Clone)]
pub struct Admission {
    tx: mpsc::Sender<ObjectId>,
    identifiers: Arc<IdentifierSet>,
    cancel: CancellationToken,
    stats: Arc<PipelineStats>,
}

impl Admission {
    pub(crate) fn new(
        tx: mpsc::Sender<ObjectId>,
        identifiers: Arc<IdentifierSet>,
        cancel: CancellationToken,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            tx,
            identifiers,
            cancel,
            stats,
        }
    }

    /// Run every id through the identifier set and enqueue the new ones.
    ///
    /// Waits while the admission queue is full. Once the pipeline is
    /// cancelled nothing further is enqueued and `ShuttingDown` is returned.
    pub async fn submit(&self, ids: &[ObjectId]) -> Result<AdmissionReport, AdmissionError> {
        if self.cancel.is_cancelled() {
            return Err(AdmissionError::ShuttingDown);
        }

        let mut report = AdmissionReport {
            received: ids.len(),
            ..Default::default()
        };
        add(&self.stats.received, ids.len() as u64);

        for &id in ids {
            if !self.identifiers.admit(id) {
                report.duplicates += 1;
                bump(&self.stats.duplicates);
                debug!(object_id = %id, "Duplicate object id skipped");
                continue;
            }

            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => false,
                result = self.tx.send(id) => result.is_ok(),
            };

            if !sent {
                // Never enqueued, so it must not block a later batch.
                self.identifiers.forget(id);
                return Err(AdmissionError::ShuttingDown);
            }

            report.admitted += 1;
            bump(&self.stats.admitted);
        }

        Ok(report)
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

/// Everything a worker needs besides its queue ends
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub fetcher: Arc<dyn DetailFetcher>,
    pub fetch_timeout: Duration,
    pub errors: ErrorReporter,
    pub stats: Arc<PipelineStats>,
    pub cancel: CancellationToken,
}

/// Spawn `size` workers sharing one admission receiver.
///
/// Each worker owns a clone of `results`; the result queue closes once the
/// last worker exits.
pub(crate) fn spawn_workers(
    size: usize,
    queue: mpsc::Receiver<ObjectId>,
    results: mpsc::Sender<ObjectDetail>,
    ctx: WorkerContext,
) -> Vec<JoinHandle<()>> {
    let queue = Arc::new(Mutex::new(queue));

    (0..size.max(1))
        .map(|worker_id| {
            let span = tracing::info_span!("fetch_worker", worker_id);
            tokio::spawn(
                run_worker(Arc::clone(&queue), results.clone(), ctx.clone()).instrument(span),
            )
        })
        .collect()
}

async fn run_worker(
    queue: Arc<Mutex<mpsc::Receiver<ObjectId>>>,
    results: mpsc::Sender<ObjectDetail>,
    ctx: WorkerContext,
) {
    debug!("Worker started");
    let mut processed = 0u64;

    while let Some(id) = next_id(&queue, &ctx.cancel).await {
        processed += 1;

        let detail = match fetch_one(&ctx, id).await {
            Ok(detail) => detail,
            Err(source) => {
                ctx.errors.report(PipelineError::Fetch { id, source });
                continue;
            },
        };

        bump(&ctx.stats.fetched);
        if results.send(detail).await.is_err() {
            debug!(object_id = %id, "Result queue closed, stopping");
            break;
        }
    }

    info!(processed, "Worker stopped");
}

/// Pull the next id unless cancelled. Ids still queued at cancellation are
/// left unfetched.
async fn next_id(
    queue: &Mutex<mpsc::Receiver<ObjectId>>,
    cancel: &CancellationToken,
) -> Option<ObjectId> {
    let mut rx = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        rx = queue.lock() => rx,
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        id = rx.recv() => id,
    }
}

async fn fetch_one(ctx: &WorkerContext, id: ObjectId) -> Result<ObjectDetail, FetchError> {
    let detail = tokio::time::timeout(ctx.fetch_timeout, ctx.fetcher.fetch_detail(id))
        .await
        .map_err(|_| FetchError::Timeout(ctx.fetch_timeout))??;

    // Fetch completion time is the only trusted timestamp.
    Ok(ObjectDetail::seen_at(id, detail.online, Utc::now()))
}
