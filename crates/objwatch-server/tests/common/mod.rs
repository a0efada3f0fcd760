//! Shared helpers for objwatch server integration tests
//!
//! - [`ScriptedFetcher`]: detail provider stand-in with per-id behavior
//! - [`FlakyStore`]: in-memory store that fails writes for chosen ids
//! - [`StalledStore`]: store whose writes never complete
//! - [`TestPostgres`]: PostgreSQL container with migrations applied
#![allow(dead_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use objwatch_common::types::{ObjectDetail, ObjectId};
use objwatch_server::config::PipelineConfig;
use objwatch_server::db::{DbError, DbResult, InMemoryObjectStore, ObjectStore, StoreRecord};
use objwatch_server::pipeline::{DetailFetcher, FetchError};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

/// Initialize test tracing once; later calls are no-ops
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("objwatch_server=debug")
        .with_test_writer()
        .try_init();
}

/// Small, fast pipeline settings for tests
pub fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        worker_pool_size: 4,
        admission_queue_capacity: 16,
        result_queue_capacity: 16,
        error_buffer_capacity: 64,
        fetch_timeout_secs: 1,
        store_timeout_secs: 1,
        ..PipelineConfig::default()
    }
}

/// Poll `check` until it holds or `limit` elapses.
pub async fn wait_until<F>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(limit, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

pub fn ids(raw: &[i64]) -> Vec<ObjectId> {
    raw.iter().copied().map(ObjectId::new).collect()
}

// ============================================================================
// Detail provider stand-in
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Online,
    Offline,
    /// Never answers; only the worker timeout ends the call
    Hang,
    Fail,
}

#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    script: HashMap<i64, Behavior>,
    calls: Mutex<Vec<i64>>,
}

impl ScriptedFetcher {
    /// Every id not scripted answers online.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: i64, behavior: Behavior) -> Self {
        self.script.insert(id, behavior);
        self
    }

    pub fn calls(&self) -> Vec<i64> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, id: i64) -> usize {
        self.calls().iter().filter(|called| **called == id).count()
    }
}

#[async_trait]
impl DetailFetcher for ScriptedFetcher {
    async fn fetch_detail(&self, id: ObjectId) -> Result<ObjectDetail, FetchError> {
        self.calls.lock().unwrap().push(id.get());

        match self.script.get(&id.get()).copied().unwrap_or(Behavior::Online) {
            Behavior::Online => Ok(ObjectDetail::observed(id, true)),
            Behavior::Offline => Ok(ObjectDetail::observed(id, false)),
            Behavior::Hang => std::future::pending().await,
            Behavior::Fail => Err(FetchError::Status(500)),
        }
    }
}

// ============================================================================
// Store that fails on demand
// ============================================================================

#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryObjectStore,
    failing: HashSet<i64>,
}

impl FlakyStore {
    pub fn failing_for(failing: &[i64]) -> Self {
        Self {
            inner: InMemoryObjectStore::new(),
            failing: failing.iter().copied().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn upsert(&self, detail: &ObjectDetail) -> DbResult<()> {
        if self.failing.contains(&detail.id.get()) {
            return Err(DbError::unavailable("write rejected"));
        }
        self.inner.upsert(detail).await
    }

    async fn delete_stale(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        self.inner.delete_stale(cutoff).await
    }

    async fn list(&self) -> DbResult<Vec<StoreRecord>> {
        self.inner.list().await
    }

    async fn get(&self, id: ObjectId) -> DbResult<Option<StoreRecord>> {
        self.inner.get(id).await
    }

    async fn delete(&self, id: ObjectId) -> DbResult<bool> {
        self.inner.delete(id).await
    }

    async fn ping(&self) -> DbResult<()> {
        self.inner.ping().await
    }
}

// ============================================================================
// Store that never finishes a write
// ============================================================================

/// Reads answer at once; every `upsert` waits forever.
#[derive(Debug, Default)]
pub struct StalledStore;

#[async_trait]
impl ObjectStore for StalledStore {
    async fn upsert(&self, _detail: &ObjectDetail) -> DbResult<()> {
        std::future::pending().await
    }

    async fn delete_stale(&self, _cutoff: DateTime<Utc>) -> DbResult<u64> {
        Ok(0)
    }

    async fn list(&self) -> DbResult<Vec<StoreRecord>> {
        Ok(Vec::new())
    }

    async fn get(&self, _id: ObjectId) -> DbResult<Option<StoreRecord>> {
        Ok(None)
    }

    async fn delete(&self, _id: ObjectId) -> DbResult<bool> {
        Ok(false)
    }

    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with the `objects` migration applied
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        objwatch_server::db::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
