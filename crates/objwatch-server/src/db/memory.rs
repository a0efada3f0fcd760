//! Process-local object store
//!
//! Same upsert/eviction semantics as the `objects` table, kept in a map.
//! Selected with `STORE_BACKEND=memory` and used throughout the tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use objwatch_common::types::{ObjectDetail, ObjectId};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::objects::{ObjectStore, StoreRecord};
use super::{DbError, DbResult};

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    rows: Mutex<BTreeMap<i64, StoreRecord>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row as-is, bypassing the pipeline. Handy for seeding.
    pub fn insert_record(&self, record: StoreRecord) -> DbResult<()> {
        self.rows()?.insert(record.id, record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rows(&self) -> DbResult<MutexGuard<'_, BTreeMap<i64, StoreRecord>>> {
        self.rows
            .lock()
            .map_err(|_| DbError::unavailable("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upsert(&self, detail: &ObjectDetail) -> DbResult<()> {
        self.rows()?.insert(detail.id.get(), StoreRecord::from(detail));
        Ok(())
    }

    async fn delete_stale(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let mut rows = self.rows()?;
        let before = rows.len();
        rows.retain(|_, record| !record.is_stale(cutoff));
        Ok((before - rows.len()) as u64)
    }

    async fn list(&self) -> DbResult<Vec<StoreRecord>> {
        Ok(self.rows()?.values().cloned().collect())
    }

    async fn get(&self, id: ObjectId) -> DbResult<Option<StoreRecord>> {
        Ok(self.rows()?.get(&id.get()).cloned())
    }

    async fn delete(&self, id: ObjectId) -> DbResult<bool> {
        Ok(self.rows()?.remove(&id.get()).is_some())
    }

    async fn ping(&self) -> DbResult<()> {
        self.rows().map(|_| ())
    }
}
