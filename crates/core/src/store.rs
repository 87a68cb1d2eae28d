//! Storage seams for notifications and view analytics.
//!
//! `guildhall-db` provides a PostgreSQL and an in-memory implementation of
//! each trait. Implementations must be safe under arbitrary interleaving of
//! calls from concurrent request handlers.

use async_trait::async_trait;

use crate::analytics::{EntityViewAnalytics, ViewRecord};
use crate::entity::{EntityKind, EntityReference};
use crate::error::CoreResult;
use crate::notification::{NewNotification, NotificationObject, NotificationPatch, StatusUpdate};
use crate::pagination::{Page, PageOf};
use crate::status::NotificationStatus;
use crate::types::{DbId, Timestamp};

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a new active notification. The id is generated by storage.
    async fn create(&self, new: NewNotification) -> CoreResult<NotificationObject>;

    /// Move a notification to `status`. Applying the current status again
    /// succeeds without touching `updated_at`.
    async fn set_status(&self, id: DbId, status: NotificationStatus) -> CoreResult<StatusUpdate>;

    /// Apply a partial title/message update.
    async fn update(&self, id: DbId, patch: NotificationPatch) -> CoreResult<NotificationObject>;

    async fn get_by_id(&self, id: DbId) -> CoreResult<NotificationObject>;

    /// Notifications for one entity, newest `created_on` first.
    async fn list_by_entity(
        &self,
        entity_ref: &EntityReference,
        status: Option<NotificationStatus>,
        page: Page,
    ) -> CoreResult<PageOf<NotificationObject>>;

    /// Notifications in one status across all entities, newest first.
    async fn list_by_status(
        &self,
        status: NotificationStatus,
        page: Page,
    ) -> CoreResult<PageOf<NotificationObject>>;

    async fn count_by_entity(
        &self,
        entity_ref: &EntityReference,
        status: Option<NotificationStatus>,
    ) -> CoreResult<i64>;

    /// Administrative removal. Returns `false` when the id did not exist.
    async fn hard_delete(&self, id: DbId) -> CoreResult<bool>;

    /// Hard-delete inactive notifications last touched before `cutoff`.
    /// Returns the number of rows removed.
    async fn purge_inactive_before(&self, cutoff: Timestamp) -> CoreResult<u64>;
}

#[async_trait]
pub trait ViewAnalyticsStore: Send + Sync {
    /// Count one view. Atomic increment-or-insert; never loses an update.
    async fn record_view(&self, entity_ref: &EntityReference) -> CoreResult<EntityViewAnalytics>;

    /// Count one view unless `view_key` was already counted for this entity.
    async fn record_view_once(
        &self,
        entity_ref: &EntityReference,
        view_key: &str,
    ) -> CoreResult<ViewRecord>;

    async fn get(&self, entity_ref: &EntityReference) -> CoreResult<Option<EntityViewAnalytics>>;

    /// Total views, `0` for an entity never viewed.
    async fn get_count(&self, entity_ref: &EntityReference) -> CoreResult<i64>;

    /// Most viewed entities of one kind, highest count first.
    async fn top_viewed(&self, kind: EntityKind, limit: i64) -> CoreResult<Vec<EntityViewAnalytics>>;

    /// Forget view keys recorded before `cutoff`. Counts are untouched; a
    /// forgotten key counts again if it is seen later.
    async fn purge_view_receipts_before(&self, cutoff: Timestamp) -> CoreResult<u64>;
}
