//! Persistence sink
//!
//! Writes online details through the [`ObjectStore`]. Every write is bounded
//! by the store timeout; a failed write is reported and the record dropped.
//! Once the pipeline is cancelled, pending and in-flight writes are
//! abandoned and counted in `discarded`.

use objwatch_common::types::ObjectDetail;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::errors::{ErrorReporter, PipelineError};
use super::stats::{bump, PipelineStats};
use crate::db::{DbError, DbResult, ObjectStore};

#[derive(Clone)]
pub struct PersistenceSink {
    store: Arc<dyn ObjectStore>,
    errors: ErrorReporter,
    stats: Arc<PipelineStats>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl PersistenceSink {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        errors: ErrorReporter,
        stats: Arc<PipelineStats>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            errors,
            stats,
            timeout,
            cancel,
        }
    }

    /// Upsert one detail. Returns whether it was written; failures go to the
    /// error sink.
    ///
    /// After cancellation nothing is written, and a write already waiting on
    /// the store is abandoned.
    pub async fn store(&self, detail: &ObjectDetail) -> bool {
        if self.cancel.is_cancelled() {
            self.discard(detail);
            return false;
        }

        let written = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = with_store_timeout(self.timeout, self.store.upsert(detail)) => Some(result),
        };

        match written {
            None => {
                self.discard(detail);
                false
            },
            Some(Ok(())) => {
                bump(&self.stats.stored);
                tracing::debug!(object_id = %detail.id, last_seen = %detail.last_seen, "Stored object");
                true
            },
            Some(Err(source)) => {
                self.errors.report(PipelineError::StoreWrite {
                    id: detail.id,
                    source,
                });
                false
            },
        }
    }

    fn discard(&self, detail: &ObjectDetail) {
        bump(&self.stats.discarded);
        tracing::debug!(object_id = %detail.id, "Shutting down, result not stored");
    }
}

/// Bound one store call; an elapsed timer becomes [`DbError::Unavailable`].
pub(crate) async fn with_store_timeout<T, F>(limit: Duration, call: F) -> DbResult<T>
where
    F: std::future::Future<Output = DbResult<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| DbError::unavailable(format!("store call exceeded {:?}", limit)))?
}
