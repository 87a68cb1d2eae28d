//! PostgreSQL-backed stores.

use std::sync::Arc;

use async_trait::async_trait;
use guildhall_core::analytics::{check_view_key, EntityViewAnalytics, ViewRecord};
use guildhall_core::entity::{EntityKind, EntityReference};
use guildhall_core::error::{CoreError, CoreResult};
use guildhall_core::notification::{
    NewNotification, NotificationObject, NotificationPatch, StatusUpdate,
};
use guildhall_core::pagination::{clamp_limit, Page, PageOf, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use guildhall_core::registry::EntityKindRegistry;
use guildhall_core::retry::{retry_cas, CasOutcome, DEFAULT_CAS_ATTEMPTS};
use guildhall_core::status::{NotificationStatus, Transition};
use guildhall_core::store::{NotificationStore, ViewAnalyticsStore};
use guildhall_core::types::{to_micros, DbId, Timestamp};

use crate::error::{classify, storage};
use crate::models::notification::into_objects;
use crate::repositories::{NotificationRepo, ViewAnalyticsRepo};
use crate::DbPool;

const NOTIFICATION: &str = "notification";
const ANALYTICS: &str = "entity_view_analytics";

/// Rows removed per statement during compaction.
pub const PURGE_BATCH_SIZE: i64 = 1000;

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// [`NotificationStore`] over the `notification_object` table.
///
/// Mutations are compare-and-set on `version` with a bounded retry budget.
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: DbPool,
    registry: Arc<EntityKindRegistry>,
    max_attempts: u32,
}

impl PgNotificationStore {
    pub fn new(pool: DbPool, registry: Arc<EntityKindRegistry>) -> Self {
        Self {
            pool,
            registry,
            max_attempts: DEFAULT_CAS_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    async fn load(&self, id: DbId) -> CoreResult<NotificationObject> {
        NotificationRepo::find_by_id(&self.pool, id)
            .await
            .map_err(|e| classify(e, NOTIFICATION, id))?
            .ok_or_else(|| CoreError::not_found(NOTIFICATION, id))?
            .try_into()
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create(&self, new: NewNotification) -> CoreResult<NotificationObject> {
        self.registry.check_reference(&new.entity_ref)?;
        new.check()?;

        let row = NotificationRepo::insert(
            &self.pool,
            &new.entity_ref,
            new.title.as_deref(),
            new.message.as_deref(),
            new.created_on.map(to_micros),
        )
        .await
        .map_err(|e| storage(e, NOTIFICATION))?;

        let created = NotificationObject::try_from(row)?;
        tracing::debug!(
            notification_id = created.id,
            entity = %created.entity_ref,
            "Notification created"
        );
        Ok(created)
    }

    async fn set_status(&self, id: DbId, status: NotificationStatus) -> CoreResult<StatusUpdate> {
        retry_cas(NOTIFICATION, id, self.max_attempts, |attempt| async move {
            let current = self.load(id).await?;
            let transition = current.status.transition_to(status);
            if transition == Transition::Unchanged {
                return Ok(CasOutcome::Done(StatusUpdate {
                    notification: current,
                    transition,
                }));
            }

            let updated = NotificationRepo::compare_and_set_status(
                &self.pool,
                id,
                current.version,
                status.id(),
            )
            .await
            .map_err(|e| classify(e, NOTIFICATION, id))?;

            match updated {
                Some(row) => Ok(CasOutcome::Done(StatusUpdate {
                    notification: row.try_into()?,
                    transition,
                })),
                None => {
                    tracing::debug!(notification_id = id, attempt, "Status CAS lost, retrying");
                    Ok(CasOutcome::Lost)
                }
            }
        })
        .await
    }

    async fn update(&self, id: DbId, patch: NotificationPatch) -> CoreResult<NotificationObject> {
        patch.check()?;
        let patch = &patch;
        retry_cas(NOTIFICATION, id, self.max_attempts, |attempt| async move {
            let current = self.load(id).await?;
            if !patch.changes(&current) {
                return Ok(CasOutcome::Done(current));
            }

            let (title, message) = patch.apply_to(&current);
            let updated = NotificationRepo::compare_and_set_content(
                &self.pool,
                id,
                current.version,
                title.as_deref(),
                message.as_deref(),
            )
            .await
            .map_err(|e| classify(e, NOTIFICATION, id))?;

            match updated {
                Some(row) => Ok(CasOutcome::Done(row.try_into()?)),
                None => {
                    tracing::debug!(notification_id = id, attempt, "Content CAS lost, retrying");
                    Ok(CasOutcome::Lost)
                }
            }
        })
        .await
    }

    async fn get_by_id(&self, id: DbId) -> CoreResult<NotificationObject> {
        self.load(id).await
    }

    async fn list_by_entity(
        &self,
        entity_ref: &EntityReference,
        status: Option<NotificationStatus>,
        page: Page,
    ) -> CoreResult<PageOf<NotificationObject>> {
        let rows = NotificationRepo::list_by_entity(
            &self.pool,
            entity_ref,
            status.map(NotificationStatus::id),
            page.after,
            page.limit + 1,
        )
        .await
        .map_err(|e| storage(e, NOTIFICATION))?;
        Ok(PageOf::from_overfetch(into_objects(rows)?, page.limit))
    }

    async fn list_by_status(
        &self,
        status: NotificationStatus,
        page: Page,
    ) -> CoreResult<PageOf<NotificationObject>> {
        let rows =
            NotificationRepo::list_by_status(&self.pool, status.id(), page.after, page.limit + 1)
                .await
                .map_err(|e| storage(e, NOTIFICATION))?;
        Ok(PageOf::from_overfetch(into_objects(rows)?, page.limit))
    }

    async fn count_by_entity(
        &self,
        entity_ref: &EntityReference,
        status: Option<NotificationStatus>,
    ) -> CoreResult<i64> {
        NotificationRepo::count_by_entity(&self.pool, entity_ref, status.map(NotificationStatus::id))
            .await
            .map_err(|e| storage(e, NOTIFICATION))
    }

    async fn hard_delete(&self, id: DbId) -> CoreResult<bool> {
        let deleted = NotificationRepo::hard_delete(&self.pool, id)
            .await
            .map_err(|e| classify(e, NOTIFICATION, id))?;
        if deleted {
            tracing::info!(notification_id = id, "Notification hard-deleted");
        }
        Ok(deleted)
    }

    async fn purge_inactive_before(&self, cutoff: Timestamp) -> CoreResult<u64> {
        let mut total = 0;
        loop {
            let deleted = NotificationRepo::delete_inactive_batch(
                &self.pool,
                NotificationStatus::Inactive.id(),
                cutoff,
                PURGE_BATCH_SIZE,
            )
            .await
            .map_err(|e| storage(e, NOTIFICATION))?;
            total += deleted;
            if deleted < PURGE_BATCH_SIZE as u64 {
                break;
            }
        }
        Ok(total)
    }
}

// ---------------------------------------------------------------------------
// View analytics
// ---------------------------------------------------------------------------

/// [`ViewAnalyticsStore`] over `entity_view_analytics` and `view_receipts`.
#[derive(Clone)]
pub struct PgViewAnalyticsStore {
    pool: DbPool,
}

impl PgViewAnalyticsStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ViewAnalyticsStore for PgViewAnalyticsStore {
    async fn record_view(&self, entity_ref: &EntityReference) -> CoreResult<EntityViewAnalytics> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| storage(e, ANALYTICS))?;
        let row = ViewAnalyticsRepo::increment(&mut conn, entity_ref)
            .await
            .map_err(|e| storage(e, ANALYTICS))?;
        row.try_into()
    }

    async fn record_view_once(
        &self,
        entity_ref: &EntityReference,
        view_key: &str,
    ) -> CoreResult<ViewRecord> {
        check_view_key(view_key)?;

        let mut tx = self.pool.begin().await.map_err(|e| storage(e, ANALYTICS))?;
        let fresh = ViewAnalyticsRepo::insert_receipt(&mut tx, entity_ref, view_key)
            .await
            .map_err(|e| storage(e, ANALYTICS))?;

        if fresh {
            let row = ViewAnalyticsRepo::increment(&mut tx, entity_ref)
                .await
                .map_err(|e| storage(e, ANALYTICS))?;
            tx.commit().await.map_err(|e| storage(e, ANALYTICS))?;
            return Ok(ViewRecord {
                analytics: row.try_into()?,
                counted: true,
            });
        }

        tx.rollback().await.map_err(|e| storage(e, ANALYTICS))?;
        tracing::debug!(entity = %entity_ref, view_key, "Duplicate view key, not counted");
        let analytics = self
            .get(entity_ref)
            .await?
            .ok_or_else(|| CoreError::not_found(ANALYTICS, entity_ref))?;
        Ok(ViewRecord {
            analytics,
            counted: false,
        })
    }

    async fn get(&self, entity_ref: &EntityReference) -> CoreResult<Option<EntityViewAnalytics>> {
        ViewAnalyticsRepo::find(&self.pool, entity_ref)
            .await
            .map_err(|e| storage(e, ANALYTICS))?
            .map(EntityViewAnalytics::try_from)
            .transpose()
    }

    async fn get_count(&self, entity_ref: &EntityReference) -> CoreResult<i64> {
        ViewAnalyticsRepo::count(&self.pool, entity_ref)
            .await
            .map_err(|e| storage(e, ANALYTICS))
    }

    async fn top_viewed(&self, kind: EntityKind, limit: i64) -> CoreResult<Vec<EntityViewAnalytics>> {
        let limit = clamp_limit(Some(limit), DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
        ViewAnalyticsRepo::top_viewed(&self.pool, kind.tag(), limit)
            .await
            .map_err(|e| storage(e, ANALYTICS))?
            .into_iter()
            .map(EntityViewAnalytics::try_from)
            .collect()
    }

    async fn purge_view_receipts_before(&self, cutoff: Timestamp) -> CoreResult<u64> {
        let mut total = 0;
        loop {
            let deleted =
                ViewAnalyticsRepo::delete_receipts_batch(&self.pool, cutoff, PURGE_BATCH_SIZE)
                    .await
                    .map_err(|e| storage(e, ANALYTICS))?;
            total += deleted;
            if deleted < PURGE_BATCH_SIZE as u64 {
                break;
            }
        }
        Ok(total)
    }
}
