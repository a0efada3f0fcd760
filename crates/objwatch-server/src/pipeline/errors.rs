//! Error sink
//!
//! Every stage reports per-item failures here instead of propagating them.
//! The buffer is bounded and producers never wait on it: when it is full the
//! new error is dropped and counted in `errors_dropped`.

use objwatch_common::types::ObjectId;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::fetcher::FetchError;
use super::stats::{bump, PipelineStats};
use crate::db::DbError;

/// Failures contained to one item or one sweep
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("fetch failed for object {id}: {source}")]
    Fetch {
        id: ObjectId,
        #[source]
        source: FetchError,
    },

    #[error("store write failed for object {id}: {source}")]
    StoreWrite {
        id: ObjectId,
        #[source]
        source: DbError,
    },

    #[error("eviction sweep failed: {0}")]
    Sweep(#[source] DbError),

    #[error("failed to delete stale object {id}: {source}")]
    RowDelete {
        id: ObjectId,
        #[source]
        source: DbError,
    },
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Fetch { .. } => "fetch",
            PipelineError::StoreWrite { .. } => "store_write",
            PipelineError::Sweep(_) => "sweep",
            PipelineError::RowDelete { .. } => "row_delete",
        }
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            PipelineError::Fetch { id, .. }
            | PipelineError::StoreWrite { id, .. }
            | PipelineError::RowDelete { id, .. } => Some(*id),
            PipelineError::Sweep(_) => None,
        }
    }
}

/// Producer handle held by each stage
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: mpsc::Sender<PipelineError>,
    stats: Arc<PipelineStats>,
}

impl ErrorReporter {
    /// Never blocks. Returns `false` when the error was dropped.
    pub fn report(&self, error: PipelineError) -> bool {
        match self.tx.try_send(error) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(error)) => {
                bump(&self.stats.errors_dropped);
                tracing::trace!(kind = error.kind(), "Error buffer full, dropping report");
                false
            },
            Err(mpsc::error::TrySendError::Closed(error)) => {
                tracing::warn!(error = %error, "Error sink closed, report lost");
                false
            },
        }
    }
}

/// Start the drain task. It exits once every [`ErrorReporter`] is dropped.
pub fn spawn_error_sink(
    capacity: usize,
    stats: Arc<PipelineStats>,
) -> (ErrorReporter, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let reporter = ErrorReporter {
        tx,
        stats: Arc::clone(&stats),
    };
    let handle = tokio::spawn(drain(rx, stats));
    (reporter, handle)
}

async fn drain(mut rx: mpsc::Receiver<PipelineError>, stats: Arc<PipelineStats>) {
    while let Some(error) = rx.recv().await {
        match &error {
            PipelineError::Fetch { id, source } => {
                bump(&stats.fetch_errors);
                tracing::warn!(object_id = %id, error = %source, "Detail fetch failed, object dropped");
            },
            PipelineError::StoreWrite { id, source } => {
                bump(&stats.store_errors);
                tracing::error!(object_id = %id, error = %source, "Failed to persist object detail");
            },
            PipelineError::Sweep(source) => {
                bump(&stats.sweep_errors);
                tracing::error!(error = %source, "Eviction sweep failed, retrying next tick");
            },
            PipelineError::RowDelete { id, source } => {
                bump(&stats.sweep_errors);
                tracing::error!(object_id = %id, error = %source, "Failed to delete stale object");
            },
        }
    }
    tracing::debug!("Error sink drained");
}
