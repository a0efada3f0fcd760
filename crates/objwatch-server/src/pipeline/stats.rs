//! Pipeline counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub received: AtomicU64,
    pub admitted: AtomicU64,
    pub duplicates: AtomicU64,
    pub fetched: AtomicU64,
    pub fetch_errors: AtomicU64,
    pub online: AtomicU64,
    pub offline: AtomicU64,
    pub stored: AtomicU64,
    pub store_errors: AtomicU64,
    /// Online results dropped unwritten because shutdown had begun
    pub discarded: AtomicU64,
    pub swept: AtomicU64,
    pub sweep_errors: AtomicU64,
    pub errors_dropped: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub admitted: u64,
    pub duplicates: u64,
    pub fetched: u64,
    pub fetch_errors: u64,
    pub online: u64,
    pub offline: u64,
    pub stored: u64,
    pub store_errors: u64,
    pub discarded: u64,
    pub swept: u64,
    pub sweep_errors: u64,
    pub errors_dropped: u64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    add(counter, 1);
}

pub(crate) fn add(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            received: load(&self.received),
            admitted: load(&self.admitted),
            duplicates: load(&self.duplicates),
            fetched: load(&self.fetched),
            fetch_errors: load(&self.fetch_errors),
            online: load(&self.online),
            offline: load(&self.offline),
            stored: load(&self.stored),
            store_errors: load(&self.store_errors),
            discarded: load(&self.discarded),
            swept: load(&self.swept),
            sweep_errors: load(&self.sweep_errors),
            errors_dropped: load(&self.errors_dropped),
        }
    }
}
