//! `PgObjectStore` against a real PostgreSQL container
//!
//! Run with: `cargo test -p objwatch-server --test postgres_store_tests -- --ignored`

use chrono::{Duration, Utc};
use objwatch_common::types::{ObjectDetail, ObjectId};
use objwatch_server::db::{ObjectStore, PgObjectStore};
use std::sync::Arc;

mod common;
use common::{ids, test_pipeline_config, wait_until, Behavior, ScriptedFetcher, TestPostgres};

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_upsert_is_idempotent() {
    let pg = TestPostgres::start().await.unwrap();
    let store = PgObjectStore::new(pg.pool().clone());

    let detail = ObjectDetail::observed(ObjectId::new(1), true);
    store.upsert(&detail).await.unwrap();
    store.upsert(&detail).await.unwrap();

    let rows = store.list().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_upsert_replaces_status_and_timestamp() {
    let pg = TestPostgres::start().await.unwrap();
    let store = PgObjectStore::new(pg.pool().clone());

    let earlier = Utc::now() - Duration::seconds(20);
    store
        .upsert(&ObjectDetail::seen_at(ObjectId::new(3), true, earlier))
        .await
        .unwrap();
    let later = ObjectDetail::observed(ObjectId::new(3), false);
    store.upsert(&later).await.unwrap();

    let row = store.get(ObjectId::new(3)).await.unwrap().unwrap();
    assert!(!row.online);
    assert!(row.last_seen > earlier);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_delete_stale_keeps_fresh_rows() {
    let pg = TestPostgres::start().await.unwrap();
    let store = PgObjectStore::new(pg.pool().clone());
    let now = Utc::now();

    for (id, age) in [(1, 31), (2, 29), (3, 120)] {
        store
            .upsert(&ObjectDetail::seen_at(
                ObjectId::new(id),
                true,
                now - Duration::seconds(age),
            ))
            .await
            .unwrap();
    }

    let deleted = store.delete_stale(now - Duration::seconds(30)).await.unwrap();
    assert_eq!(deleted, 2);

    let remaining: Vec<i64> = store.list().await.unwrap().iter().map(|r| r.id).collect();
    assert_eq!(remaining, vec![2]);

    assert!(store.delete(ObjectId::new(2)).await.unwrap());
    assert!(!store.delete(ObjectId::new(2)).await.unwrap());
    store.ping().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_pipeline_persists_to_postgres() {
    use objwatch_server::pipeline::{Pipeline, Supervisor};

    let pg = TestPostgres::start().await.unwrap();
    let store = Arc::new(PgObjectStore::new(pg.pool().clone()));
    let fetcher = ScriptedFetcher::new().with(2, Behavior::Offline);

    let pipeline = Pipeline::start(
        &test_pipeline_config(),
        Arc::new(fetcher),
        store.clone(),
        Supervisor::new(),
    );
    pipeline.admission().submit(&ids(&[1, 2, 3])).await.unwrap();

    let stats = pipeline.stats();
    assert!(wait_until(std::time::Duration::from_secs(5), || stats.snapshot().stored == 2).await);
    pipeline.shutdown().await;

    let stored: Vec<i64> = store.list().await.unwrap().iter().map(|r| r.id).collect();
    assert_eq!(stored, vec![1, 3]);
}
