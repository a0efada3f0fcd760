//! Eviction sweeper
//!
//! On every tick, deletes records whose `last_seen` is older than the
//! retention TTL and purges expired identifier set entries. A failed sweep
//! is reported and simply retried on the next tick.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::errors::{ErrorReporter, PipelineError};
use super::identifiers::IdentifierSet;
use super::sink::with_store_timeout;
use super::stats::{add, PipelineStats};
use crate::config::SweepMode;
use crate::db::{DbResult, ObjectStore};

#[derive(Clone)]
pub struct Sweeper {
    store: Arc<dyn ObjectStore>,
    identifiers: Arc<IdentifierSet>,
    errors: ErrorReporter,
    stats: Arc<PipelineStats>,
    ttl: Duration,
    every: Duration,
    mode: SweepMode,
    store_timeout: Duration,
}

/// Timing and strategy of one [`Sweeper`]
#[derive(Debug, Clone, Copy)]
pub struct SweepSettings {
    pub ttl: Duration,
    pub interval: Duration,
    pub mode: SweepMode,
    pub store_timeout: Duration,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        identifiers: Arc<IdentifierSet>,
        errors: ErrorReporter,
        stats: Arc<PipelineStats>,
        settings: SweepSettings,
    ) -> Self {
        Self {
            store,
            identifiers,
            errors,
            stats,
            ttl: settings.ttl,
            every: settings.interval,
            mode: settings.mode,
            store_timeout: settings.store_timeout,
        }
    }

    /// Oldest `last_seen` that survives a sweep at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub async fn sweep_once(&self) -> DbResult<u64> {
        self.sweep_at(Utc::now()).await
    }

    /// Delete every record with `last_seen < now - ttl`.
    ///
    /// In row-by-row mode a failed row delete is reported on its own and the
    /// sweep moves on; only a failed scan fails the whole sweep.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let cutoff = self.cutoff(now);

        let deleted = match self.mode {
            SweepMode::Targeted => {
                with_store_timeout(self.store_timeout, self.store.delete_stale(cutoff)).await?
            },
            SweepMode::RowByRow => self.sweep_rows(cutoff).await?,
        };

        add(&self.stats.swept, deleted);
        if deleted > 0 {
            info!(deleted, cutoff = %cutoff, "Evicted stale objects");
        }
        Ok(deleted)
    }

    async fn sweep_rows(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let records = with_store_timeout(self.store_timeout, self.store.list()).await?;

        let mut deleted = 0;
        for record in records.iter().filter(|record| record.is_stale(cutoff)) {
            let id = record.object_id();
            match with_store_timeout(self.store_timeout, self.store.delete(id)).await {
                Ok(true) => deleted += 1,
                Ok(false) => debug!(object_id = %id, "Stale object already gone"),
                Err(source) => {
                    self.errors.report(PipelineError::RowDelete { id, source });
                },
            }
        }
        Ok(deleted)
    }

    async fn tick(&self) {
        if let Err(e) = self.sweep_once().await {
            self.errors.report(PipelineError::Sweep(e));
        }

        let purged = self.identifiers.purge_expired();
        if purged > 0 {
            debug!(purged, "Purged expired identifier entries");
        }
    }

    /// Tick until cancelled. The first tick fires immediately, and
    /// cancellation also cuts a running sweep short.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.every.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                ttl_secs = self.ttl.as_secs(),
                interval_ms = self.every.as_millis() as u64,
                mode = ?self.mode,
                "Sweeper started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        // A sweep in progress is abandoned; deletes are idempotent.
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                debug!("Sweep interrupted by shutdown");
                                break;
                            },
                            _ = self.tick() => {},
                        }
                    },
                }
            }

            info!("Sweeper stopped");
        })
    }
}
