//! Identifier set (dedup gate)
//!
//! Records every object id admitted to the worker pool. An id stays blocked
//! until its retention window lapses or it is cleared explicitly; a failed
//! fetch does not unblock it.

use objwatch_common::types::ObjectId;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct IdentifierSet {
    entries: Mutex<Entries>,
    retention: Option<Duration>,
    max_entries: Option<usize>,
}

/// Lookup map plus an admission-ordered index over the same entries.
/// Both always hold exactly the same `(id, admitted_at)` pairs.
#[derive(Debug, Default)]
struct Entries {
    by_id: HashMap<ObjectId, Instant>,
    by_age: BTreeSet<(Instant, ObjectId)>,
}

impl Entries {
    fn insert(&mut self, id: ObjectId, admitted_at: Instant) {
        if let Some(previous) = self.by_id.insert(id, admitted_at) {
            self.by_age.remove(&(previous, id));
        }
        self.by_age.insert((admitted_at, id));
    }

    fn remove(&mut self, id: ObjectId) -> bool {
        match self.by_id.remove(&id) {
            Some(admitted_at) => {
                self.by_age.remove(&(admitted_at, id));
                true
            },
            None => false,
        }
    }

    /// Oldest admission first.
    fn pop_oldest(&mut self) -> Option<(Instant, ObjectId)> {
        let oldest = self.by_age.pop_first()?;
        self.by_id.remove(&oldest.1);
        Some(oldest)
    }

    fn oldest(&self) -> Option<Instant> {
        self.by_age.first().map(|(admitted_at, _)| *admitted_at)
    }

    fn clear(&mut self) {
        self.by_id.clear();
        self.by_age.clear();
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }
}

impl IdentifierSet {
    /// Set without expiry or size bound.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(mut self, retention: Option<Duration>) -> Self {
        self.retention = retention;
        self
    }

    /// Cap the number of tracked ids; the oldest admission is evicted first.
    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries.filter(|max| *max > 0);
        self
    }

    /// Record `id` if it is not currently held. Returns `true` exactly once
    /// per retention window for a given id, however many callers race.
    pub fn admit(&self, id: ObjectId) -> bool {
        self.admit_at(id, Instant::now())
    }

    fn admit_at(&self, id: ObjectId, now: Instant) -> bool {
        let mut entries = self.lock();

        match entries.by_id.get(&id) {
            Some(admitted_at) if !self.is_expired(*admitted_at, now) => return false,
            Some(_) => {},
            None => {
                if let Some(max) = self.max_entries {
                    self.make_room(&mut entries, max, now);
                }
            },
        }

        entries.insert(id, now);
        true
    }

    /// Drop `id` so the next batch containing it is fetched again.
    pub fn forget(&self, id: ObjectId) -> bool {
        self.lock().remove(id)
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    /// Remove entries whose retention window has lapsed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        self.drop_expired(&mut entries, now)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        let now = Instant::now();
        self.lock()
            .by_id
            .get(&id)
            .is_some_and(|admitted_at| !self.is_expired(*admitted_at, now))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, admitted_at: Instant, now: Instant) -> bool {
        self.retention
            .is_some_and(|retention| now.saturating_duration_since(admitted_at) >= retention)
    }

    /// Expired entries are always the oldest, so this stops at the first
    /// live one.
    fn drop_expired(&self, entries: &mut Entries, now: Instant) -> usize {
        let mut dropped = 0;
        while entries
            .oldest()
            .is_some_and(|admitted_at| self.is_expired(admitted_at, now))
        {
            entries.pop_oldest();
            dropped += 1;
        }
        dropped
    }

    fn make_room(&self, entries: &mut Entries, max: usize, now: Instant) {
        if entries.len() < max {
            return;
        }
        self.drop_expired(entries, now);

        while entries.len() >= max {
            match entries.pop_oldest() {
                Some((_, id)) => {
                    tracing::debug!(object_id = %id, "Identifier set full, evicted oldest entry");
                },
                None => break,
            }
        }
    }

    // The entries stay consistent after any panic mid-operation, so poisoning
    // is ignored.
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
