//! Object liveness pipeline
//!
//! ```text
//! ingest ──► Admission ──► [admission queue] ──► workers ──► [result queue]
//!              │ IdentifierSet                      │              │
//!              ▼                                    ▼              ▼
//!          duplicates                         ErrorSink ◄──── filter ──► sink ──► store
//!                                                 ▲                               ▲
//!                                                 └──────────── sweeper ──────────┘
//! ```
//!
//! One [`Supervisor`] token cancels every stage; [`Pipeline::shutdown`]
//! joins them in dependency order.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::db::ObjectStore;

pub mod errors;
pub mod fetcher;
pub mod filter;
pub mod identifiers;
pub mod sink;
pub mod stats;
pub mod supervisor;
pub mod sweeper;
pub mod workers;

pub use errors::{ErrorReporter, PipelineError};
pub use fetcher::{DetailFetcher, FetchError, HttpDetailFetcher};
pub use identifiers::IdentifierSet;
pub use sink::PersistenceSink;
pub use stats::{PipelineStats, StatsSnapshot};
pub use supervisor::{ShutdownCause, Supervisor};
pub use sweeper::{SweepSettings, Sweeper};
pub use workers::{Admission, AdmissionError, AdmissionReport};

/// Final outcome returned by [`Pipeline::shutdown`]
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub cause: ShutdownCause,
    pub stats: StatsSnapshot,
}

/// Running pipeline: handles to every stage plus the shared state the HTTP
/// layer needs.
pub struct Pipeline {
    admission: Admission,
    identifiers: Arc<IdentifierSet>,
    stats: Arc<PipelineStats>,
    store: Arc<dyn ObjectStore>,
    supervisor: Supervisor,
    reporter: ErrorReporter,
    workers: Vec<JoinHandle<()>>,
    filter: JoinHandle<()>,
    sweeper: JoinHandle<()>,
    error_drain: JoinHandle<()>,
}

impl Pipeline {
    /// Spawn every stage. Must be called inside a tokio runtime.
    pub fn start(
        config: &PipelineConfig,
        fetcher: Arc<dyn DetailFetcher>,
        store: Arc<dyn ObjectStore>,
        supervisor: Supervisor,
    ) -> Self {
        let stats = Arc::new(PipelineStats::new());
        let identifiers = Arc::new(
            IdentifierSet::new()
                .with_retention(config.dedup_retention())
                .with_max_entries(config.dedup_max_entries),
        );
        let cancel = supervisor.token();

        let (reporter, error_drain) =
            errors::spawn_error_sink(config.error_buffer_capacity, Arc::clone(&stats));

        let (admission_tx, admission_rx) = mpsc::channel(config.admission_queue_capacity.max(1));
        let (result_tx, result_rx) = mpsc::channel(config.result_queue_capacity.max(1));

        let workers = workers::spawn_workers(
            config.worker_pool_size,
            admission_rx,
            result_tx,
            workers::WorkerContext {
                fetcher,
                fetch_timeout: config.fetch_timeout(),
                errors: reporter.clone(),
                stats: Arc::clone(&stats),
                cancel: cancel.clone(),
            },
        );

        let sink = PersistenceSink::new(
            Arc::clone(&store),
            reporter.clone(),
            Arc::clone(&stats),
            config.store_timeout(),
            cancel.clone(),
        );
        let filter = filter::spawn_filter(result_rx, sink, Arc::clone(&stats));

        let sweeper = Sweeper::new(
            Arc::clone(&store),
            Arc::clone(&identifiers),
            reporter.clone(),
            Arc::clone(&stats),
            SweepSettings {
                ttl: config.retention_ttl(),
                interval: config.sweep_interval(),
                mode: config.sweep_mode,
                store_timeout: config.store_timeout(),
            },
        )
        .spawn(cancel.clone());

        let admission = Admission::new(
            admission_tx,
            Arc::clone(&identifiers),
            cancel,
            Arc::clone(&stats),
        );

        info!(
            workers = config.worker_pool_size,
            admission_queue = config.admission_queue_capacity,
            result_queue = config.result_queue_capacity,
            "Pipeline started"
        );

        Self {
            admission,
            identifiers,
            stats,
            store,
            supervisor,
            reporter,
            workers,
            filter,
            sweeper,
            error_drain,
        }
    }

    pub fn admission(&self) -> Admission {
        self.admission.clone()
    }

    pub fn identifiers(&self) -> Arc<IdentifierSet> {
        Arc::clone(&self.identifiers)
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Block until something triggers shutdown, then drain.
    pub async fn wait(self) -> PipelineReport {
        self.supervisor.cancelled().await;
        self.shutdown().await
    }

    /// Cancel (if nobody has yet) and drain every stage in order:
    /// workers, filter, sweeper, then the error sink once no reporter is left.
    pub async fn shutdown(self) -> PipelineReport {
        let Pipeline {
            admission,
            stats,
            supervisor,
            reporter,
            workers,
            filter,
            sweeper,
            error_drain,
            ..
        } = self;

        supervisor.request_shutdown();
        drop(admission);

        for result in join_all(workers).await {
            log_join("fetch worker", result);
        }
        log_join("result filter", filter.await);
        log_join("sweeper", sweeper.await);

        // Last reporter; the drain exits once it is gone.
        drop(reporter);
        log_join("error sink", error_drain.await);

        let cause = supervisor.cause().unwrap_or(ShutdownCause::Requested);
        let stats = stats.snapshot();
        info!(cause = %cause, ?stats, "Pipeline stopped");

        PipelineReport { cause, stats }
    }
}

fn log_join(stage: &str, result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        warn!(stage, error = %e, "Pipeline task ended abnormally");
    }
}
