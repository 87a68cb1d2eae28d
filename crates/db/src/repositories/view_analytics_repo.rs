//! Repository for the `entity_view_analytics` and `view_receipts` tables.

use guildhall_core::entity::EntityReference;
use guildhall_core::types::Timestamp;
use sqlx::{PgConnection, PgPool};

use crate::models::view_analytics::{ViewAnalyticsRow, COLUMNS};

/// Provides counter operations for entity view analytics.
pub struct ViewAnalyticsRepo;

impl ViewAnalyticsRepo {
    /// Count one view for an entity.
    ///
    /// Uses INSERT ... ON CONFLICT to upsert: the first view inserts a row
    /// (id from the column default), later views increment `view_count` in
    /// place under the row lock.
    pub async fn increment(
        conn: &mut PgConnection,
        entity_ref: &EntityReference,
    ) -> Result<ViewAnalyticsRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO entity_view_analytics \
                 (entity_type, entity_id, view_count, first_viewed_at, last_viewed_at) \
             VALUES ($1, $2, 1, NOW(), NOW()) \
             ON CONFLICT (entity_type, entity_id) DO UPDATE SET \
                 view_count = entity_view_analytics.view_count + 1, \
                 last_viewed_at = GREATEST(entity_view_analytics.last_viewed_at, EXCLUDED.last_viewed_at), \
                 updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ViewAnalyticsRow>(&query)
            .bind(entity_ref.entity_type().tag())
            .bind(entity_ref.entity_id())
            .fetch_one(conn)
            .await
    }

    /// Store an idempotency receipt. Returns `false` if the key was already
    /// recorded for this entity.
    pub async fn insert_receipt(
        conn: &mut PgConnection,
        entity_ref: &EntityReference,
        view_key: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO view_receipts (entity_type, entity_id, view_key) \
             VALUES ($1, $2, $3) \
             ON CONFLICT DO NOTHING",
        )
        .bind(entity_ref.entity_type().tag())
        .bind(entity_ref.entity_id())
        .bind(view_key)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find the counter row for an entity.
    pub async fn find(
        pool: &PgPool,
        entity_ref: &EntityReference,
    ) -> Result<Option<ViewAnalyticsRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM entity_view_analytics \
             WHERE entity_type = $1 AND entity_id = $2"
        );
        sqlx::query_as::<_, ViewAnalyticsRow>(&query)
            .bind(entity_ref.entity_type().tag())
            .bind(entity_ref.entity_id())
            .fetch_optional(pool)
            .await
    }

    /// Read `view_count`, or `0` when the entity was never viewed.
    pub async fn count(pool: &PgPool, entity_ref: &EntityReference) -> Result<i64, sqlx::Error> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT view_count FROM entity_view_analytics \
             WHERE entity_type = $1 AND entity_id = $2",
        )
        .bind(entity_ref.entity_type().tag())
        .bind(entity_ref.entity_id())
        .fetch_optional(pool)
        .await?;
        Ok(count.unwrap_or(0))
    }

    /// Most viewed entities of one kind.
    ///
    /// The `limit` should already be validated/clamped by the caller.
    pub async fn top_viewed(
        pool: &PgPool,
        entity_type: i16,
        limit: i64,
    ) -> Result<Vec<ViewAnalyticsRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM entity_view_analytics \
             WHERE entity_type = $1 \
             ORDER BY view_count DESC, last_viewed_at DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, ViewAnalyticsRow>(&query)
            .bind(entity_type)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Delete up to `batch_size` receipts created before `cutoff`.
    pub async fn delete_receipts_batch(
        pool: &PgPool,
        cutoff: Timestamp,
        batch_size: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM view_receipts WHERE (entity_type, entity_id, view_key) IN ( \
                 SELECT entity_type, entity_id, view_key FROM view_receipts \
                 WHERE created_at < $1 \
                 LIMIT $2 \
                 FOR UPDATE SKIP LOCKED \
             )",
        )
        .bind(cutoff)
        .bind(batch_size)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
