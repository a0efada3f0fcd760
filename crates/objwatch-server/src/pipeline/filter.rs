//! Result filter
//!
//! Sole consumer of the result queue. Offline details are counted and
//! discarded; online ones go to the persistence sink.

use objwatch_common::types::ObjectDetail;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::sink::PersistenceSink;
use super::stats::{bump, PipelineStats};

/// Only online objects are persisted.
pub fn is_persistable(detail: &ObjectDetail) -> bool {
    detail.online
}

/// Runs until the result queue closes, i.e. until every worker has exited.
/// After cancellation the queue is still drained so workers never block on
/// it, but the sink discards what it receives.
pub(crate) fn spawn_filter(
    mut results: mpsc::Receiver<ObjectDetail>,
    sink: PersistenceSink,
    stats: Arc<PipelineStats>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(detail) = results.recv().await {
            if !is_persistable(&detail) {
                bump(&stats.offline);
                tracing::debug!(object_id = %detail.id, "Object offline, not stored");
                continue;
            }

            bump(&stats.online);
            sink.store(&detail).await;
        }
        tracing::debug!("Result queue closed, filter stopped");
    })
}
