//! Repository for the `notification_object` table.

use guildhall_core::entity::EntityReference;
use guildhall_core::pagination::Cursor;
use guildhall_core::status::StatusId;
use guildhall_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::notification::{NotificationRow, COLUMNS};

/// `updated_at` for a mutation: the commit-time clock, strictly past the
/// previous value even when two commits share a clock tick.
const NEXT_UPDATED_AT: &str =
    "GREATEST(clock_timestamp(), updated_at + INTERVAL '1 microsecond')";

/// Provides CRUD operations for notifications.
pub struct NotificationRepo;

impl NotificationRepo {
    /// Insert a notification. `created_on` falls back to `NOW()`.
    pub async fn insert(
        pool: &PgPool,
        entity_ref: &EntityReference,
        title: Option<&str>,
        message: Option<&str>,
        created_on: Option<Timestamp>,
    ) -> Result<NotificationRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO notification_object \
                 (entity_type, entity_id, created_on, title, message) \
             VALUES ($1, $2, COALESCE($3, NOW()), $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(entity_ref.entity_type().tag())
            .bind(entity_ref.entity_id())
            .bind(created_on)
            .bind(title)
            .bind(message)
            .fetch_one(pool)
            .await
    }

    /// Find a notification by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<NotificationRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notification_object WHERE id = $1");
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Set `status` if the row is still at `expected_version`.
    ///
    /// Returns `None` when another writer committed first (or the row is gone).
    pub async fn compare_and_set_status(
        pool: &PgPool,
        id: DbId,
        expected_version: i64,
        status: StatusId,
    ) -> Result<Option<NotificationRow>, sqlx::Error> {
        let query = format!(
            "UPDATE notification_object \
             SET status = $3, version = version + 1, updated_at = {NEXT_UPDATED_AT} \
             WHERE id = $1 AND version = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(id)
            .bind(expected_version)
            .bind(status)
            .fetch_optional(pool)
            .await
    }

    /// Replace `title` and `message` if the row is still at `expected_version`.
    pub async fn compare_and_set_content(
        pool: &PgPool,
        id: DbId,
        expected_version: i64,
        title: Option<&str>,
        message: Option<&str>,
    ) -> Result<Option<NotificationRow>, sqlx::Error> {
        let query = format!(
            "UPDATE notification_object \
             SET title = $3, message = $4, version = version + 1, \
                 updated_at = {NEXT_UPDATED_AT} \
             WHERE id = $1 AND version = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(id)
            .bind(expected_version)
            .bind(title)
            .bind(message)
            .fetch_optional(pool)
            .await
    }

    /// List notifications for an entity, newest `created_on` first.
    ///
    /// Fetches up to `limit` rows strictly after `after` in
    /// `(created_on DESC, id DESC)` order.
    pub async fn list_by_entity(
        pool: &PgPool,
        entity_ref: &EntityReference,
        status: Option<StatusId>,
        after: Option<Cursor>,
        limit: i64,
    ) -> Result<Vec<NotificationRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_object \
             WHERE entity_type = $1 AND entity_id = $2 \
               AND ($3::smallint IS NULL OR status = $3) \
               AND ($4::timestamptz IS NULL OR (created_on, id) < ($4::timestamptz, $5::bigint)) \
             ORDER BY created_on DESC, id DESC \
             LIMIT $6"
        );
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(entity_ref.entity_type().tag())
            .bind(entity_ref.entity_id())
            .bind(status)
            .bind(after.map(|c| c.created_on))
            .bind(after.map(|c| c.id))
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// List notifications in one status across all entities, newest first.
    pub async fn list_by_status(
        pool: &PgPool,
        status: StatusId,
        after: Option<Cursor>,
        limit: i64,
    ) -> Result<Vec<NotificationRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_object \
             WHERE status = $1 \
               AND ($2::timestamptz IS NULL OR (created_on, id) < ($2::timestamptz, $3::bigint)) \
             ORDER BY created_on DESC, id DESC \
             LIMIT $4"
        );
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(status)
            .bind(after.map(|c| c.created_on))
            .bind(after.map(|c| c.id))
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Count notifications for an entity, optionally in one status.
    pub async fn count_by_entity(
        pool: &PgPool,
        entity_ref: &EntityReference,
        status: Option<StatusId>,
    ) -> Result<i64, sqlx::Error> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification_object \
             WHERE entity_type = $1 AND entity_id = $2 \
               AND ($3::smallint IS NULL OR status = $3)",
        )
        .bind(entity_ref.entity_type().tag())
        .bind(entity_ref.entity_id())
        .bind(status)
        .fetch_one(pool)
        .await?;
        Ok(count.unwrap_or(0))
    }

    /// Permanently delete a notification.
    pub async fn hard_delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notification_object WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete up to `batch_size` inactive rows last updated before `cutoff`.
    ///
    /// Rows locked by in-flight writers are skipped, not waited on.
    pub async fn delete_inactive_batch(
        pool: &PgPool,
        inactive: StatusId,
        cutoff: Timestamp,
        batch_size: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM notification_object WHERE id IN ( \
                 SELECT id FROM notification_object \
                 WHERE status = $1 AND updated_at < $2 \
                 ORDER BY id \
                 LIMIT $3 \
                 FOR UPDATE SKIP LOCKED \
             )",
        )
        .bind(inactive)
        .bind(cutoff)
        .bind(batch_size)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
