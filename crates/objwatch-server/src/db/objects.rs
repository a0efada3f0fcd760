//! `objects` table access

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use objwatch_common::types::{ObjectDetail, ObjectId};
use serde::Serialize;
use sqlx::PgPool;

use super::DbResult;

/// One persisted row; primary key is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StoreRecord {
    pub id: i64,
    pub online: bool,
    #[sqlx(rename = "lastseen")]
    pub last_seen: DateTime<Utc>,
}

impl StoreRecord {
    pub fn object_id(&self) -> ObjectId {
        ObjectId::new(self.id)
    }

    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_seen < cutoff
    }
}

impl From<&ObjectDetail> for StoreRecord {
    fn from(detail: &ObjectDetail) -> Self {
        Self {
            id: detail.id.get(),
            online: detail.online,
            last_seen: detail.last_seen,
        }
    }
}

/// Durable store operations used by the persistence sink and the sweeper.
///
/// Implementations must be safe to call concurrently; isolation is left to
/// the backing store.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Insert or replace the row for `detail.id`.
    async fn upsert(&self, detail: &ObjectDetail) -> DbResult<()>;

    /// Delete every row with `lastseen < cutoff`, returning how many went.
    async fn delete_stale(&self, cutoff: DateTime<Utc>) -> DbResult<u64>;

    async fn list(&self) -> DbResult<Vec<StoreRecord>>;

    async fn get(&self, id: ObjectId) -> DbResult<Option<StoreRecord>>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: ObjectId) -> DbResult<bool>;

    async fn ping(&self) -> DbResult<()>;
}

/// PostgreSQL-backed store sharing the service connection pool
#[derive(Clone)]
pub struct PgObjectStore {
    pool: PgPool,
}

impl PgObjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ObjectStore for PgObjectStore {
    async fn upsert(&self, detail: &ObjectDetail) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO objects (id, online, lastseen)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET online = EXCLUDED.online,
                lastseen = EXCLUDED.lastseen
            "#,
        )
        .bind(detail.id.get())
        .bind(detail.online)
        .bind(detail.last_seen)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_stale(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM objects WHERE lastseen < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list(&self) -> DbResult<Vec<StoreRecord>> {
        let records = sqlx::query_as::<_, StoreRecord>(
            "SELECT id, online, lastseen FROM objects ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn get(&self, id: ObjectId) -> DbResult<Option<StoreRecord>> {
        let record = sqlx::query_as::<_, StoreRecord>(
            "SELECT id, online, lastseen FROM objects WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete(&self, id: ObjectId) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM objects WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> DbResult<()> {
        super::health_check(&self.pool).await
    }
}

impl std::fmt::Debug for PgObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgObjectStore")
            .field("connections", &self.pool.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_record_staleness_is_strict() {
        let now = Utc::now();
        let record = StoreRecord {
            id: 1,
            online: true,
            last_seen: now,
        };
        assert!(!record.is_stale(now));
        assert!(record.is_stale(now + Duration::milliseconds(1)));
    }

    #[test]
    fn test_record_from_detail() {
        let detail = ObjectDetail::observed(ObjectId::new(9), true);
        let record = StoreRecord::from(&detail);
        assert_eq!(record.object_id(), ObjectId::new(9));
        assert_eq!(record.last_seen, detail.last_seen);
    }
}
