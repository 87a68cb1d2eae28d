//! Notification dispatch and query facade.
//!
//! [`NotificationDispatcher`] is what request handlers talk to. It resolves
//! raw references, writes through the storage traits, publishes lifecycle
//! events on the [`NotificationBus`] and filters orphaned notifications out
//! of read paths.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use guildhall_core::analytics::{EntityViewAnalytics, ViewRecord};
use guildhall_core::entity::EntityReference;
use guildhall_core::error::CoreResult;
use guildhall_core::notification::{NewNotification, NotificationObject, StatusUpdate};
use guildhall_core::pagination::{Page, PageOf};
use guildhall_core::registry::EntityKindRegistry;
use guildhall_core::status::NotificationStatus;
use guildhall_core::store::{NotificationStore, ViewAnalyticsStore};
use guildhall_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::bus::{NotificationBus, NotificationEvent, NotificationEventKind};
use crate::liveness::{probe_liveness, require_exists, Liveness};

/// Default upper bound for one liveness probe call.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// Config and DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Ask the kind's probe whether the entity exists before creating a
    /// notification for it.
    pub strict_references: bool,
    pub probe_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            strict_references: false,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Content of a notification sent through [`NotificationDispatcher::notify_entity`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationPayload {
    pub title: Option<String>,
    pub message: Option<String>,
    /// Event time. Defaults to the time of insertion.
    pub created_on: Option<Timestamp>,
}

impl NotificationPayload {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// A notification together with whether its target entity is gone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedNotification {
    #[serde(flatten)]
    pub notification: NotificationObject,
    pub orphaned: bool,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct NotificationDispatcher {
    registry: Arc<EntityKindRegistry>,
    notifications: Arc<dyn NotificationStore>,
    analytics: Arc<dyn ViewAnalyticsStore>,
    bus: Arc<NotificationBus>,
    config: DispatcherConfig,
}

impl NotificationDispatcher {
    pub fn new(
        registry: Arc<EntityKindRegistry>,
        notifications: Arc<dyn NotificationStore>,
        analytics: Arc<dyn ViewAnalyticsStore>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        Self {
            registry,
            notifications,
            analytics,
            bus,
            config: DispatcherConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> DispatcherConfig {
        self.config
    }

    pub fn registry(&self) -> &EntityKindRegistry {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    /// Validate a raw reference, probing for existence in strict mode.
    pub async fn resolve(&self, entity_type: i16, entity_id: &str) -> CoreResult<EntityReference> {
        let entity_ref = self.registry.resolve(entity_type, entity_id)?;
        if self.config.strict_references {
            require_exists(&self.registry, &entity_ref, self.config.probe_timeout).await?;
        }
        Ok(entity_ref)
    }

    // -- notifications ------------------------------------------------------

    /// Create an active notification for `(entity_type, entity_id)` and
    /// announce it on the bus.
    pub async fn notify_entity(
        &self,
        entity_type: i16,
        entity_id: &str,
        payload: NotificationPayload,
    ) -> CoreResult<NotificationObject> {
        let entity_ref = self.resolve(entity_type, entity_id).await?;

        let new = NewNotification {
            entity_ref,
            title: payload.title,
            message: payload.message,
            created_on: payload.created_on,
        };
        let created = self.notifications.create(new).await?;

        tracing::info!(
            notification_id = created.id,
            entity_type = entity_ref.entity_type().tag(),
            entity_id = %entity_ref.entity_id(),
            "Notification dispatched"
        );
        self.bus
            .publish(NotificationEvent::new(NotificationEventKind::Created, &created));
        Ok(created)
    }

    /// Mark a notification as read/dismissed. Idempotent.
    pub async fn acknowledge(&self, id: DbId) -> CoreResult<StatusUpdate> {
        self.transition(id, NotificationStatus::Inactive, NotificationEventKind::Acknowledged)
            .await
    }

    /// Bring an acknowledged notification back. Idempotent.
    pub async fn resurface(&self, id: DbId) -> CoreResult<StatusUpdate> {
        self.transition(id, NotificationStatus::Active, NotificationEventKind::Resurfaced)
            .await
    }

    async fn transition(
        &self,
        id: DbId,
        status: NotificationStatus,
        event: NotificationEventKind,
    ) -> CoreResult<StatusUpdate> {
        let update = self.notifications.set_status(id, status).await?;
        if update.transition.is_change() {
            tracing::debug!(notification_id = id, transition = ?update.transition, "Notification status changed");
            self.bus
                .publish(NotificationEvent::new(event, &update.notification));
        }
        Ok(update)
    }

    /// Active notifications of one entity, newest first.
    ///
    /// If the entity's kind has a liveness probe and it reports the entity
    /// gone, the result is empty. A slow or failing probe counts as alive.
    pub async fn active_notifications_for(
        &self,
        entity_ref: &EntityReference,
        page: Page,
    ) -> CoreResult<PageOf<NotificationObject>> {
        let result = self
            .notifications
            .list_by_entity(entity_ref, Some(NotificationStatus::Active), page)
            .await?;
        if result.items.is_empty() {
            return Ok(result);
        }

        let liveness = probe_liveness(&self.registry, entity_ref, self.config.probe_timeout).await;
        if liveness.is_orphaned() {
            tracing::debug!(
                entity_type = entity_ref.entity_type().tag(),
                entity_id = %entity_ref.entity_id(),
                omitted = result.items.len(),
                "Omitting notifications of deleted entity"
            );
            return Ok(PageOf::empty());
        }
        Ok(result)
    }

    /// Notifications of one entity with an `orphaned` flag instead of
    /// omission.
    pub async fn annotated_notifications_for(
        &self,
        entity_ref: &EntityReference,
        status: Option<NotificationStatus>,
        page: Page,
    ) -> CoreResult<PageOf<AnnotatedNotification>> {
        let result = self
            .notifications
            .list_by_entity(entity_ref, status, page)
            .await?;
        let orphaned = if result.items.is_empty() {
            false
        } else {
            probe_liveness(&self.registry, entity_ref, self.config.probe_timeout)
                .await
                .is_orphaned()
        };

        Ok(PageOf {
            items: result
                .items
                .into_iter()
                .map(|notification| AnnotatedNotification {
                    notification,
                    orphaned,
                })
                .collect(),
            next: result.next,
        })
    }

    /// Active notifications across all entities, orphans omitted.
    ///
    /// Each distinct entity on the page is probed once; probes run
    /// concurrently. The page may hold fewer than `limit` items when orphans
    /// were dropped, but `next` still continues after the last stored row.
    pub async fn active_feed(&self, page: Page) -> CoreResult<PageOf<NotificationObject>> {
        let result = self
            .notifications
            .list_by_status(NotificationStatus::Active, page)
            .await?;

        let mut seen = HashSet::new();
        let targets: Vec<EntityReference> = result
            .items
            .iter()
            .map(|n| n.entity_ref)
            .filter(|r| seen.insert(*r))
            .collect();

        let timeout = self.config.probe_timeout;
        let probes = targets
            .iter()
            .map(|r| probe_liveness(&self.registry, r, timeout));
        let liveness: HashMap<EntityReference, Liveness> =
            targets.iter().copied().zip(join_all(probes).await).collect();

        let before = result.items.len();
        let items: Vec<NotificationObject> = result
            .items
            .into_iter()
            .filter(|n| {
                !liveness
                    .get(&n.entity_ref)
                    .is_some_and(|l| l.is_orphaned())
            })
            .collect();
        if items.len() < before {
            tracing::debug!(omitted = before - items.len(), "Omitting orphaned notifications from feed");
        }

        Ok(PageOf {
            items,
            next: result.next,
        })
    }

    // -- view analytics -----------------------------------------------------

    /// Count one view of `(entity_type, entity_id)`.
    pub async fn record_view(
        &self,
        entity_type: i16,
        entity_id: &str,
    ) -> CoreResult<EntityViewAnalytics> {
        let entity_ref = self.registry.resolve(entity_type, entity_id)?;
        self.analytics.record_view(&entity_ref).await
    }

    /// Count one view unless `view_key` was already counted.
    pub async fn record_view_once(
        &self,
        entity_type: i16,
        entity_id: &str,
        view_key: &str,
    ) -> CoreResult<ViewRecord> {
        let entity_ref = self.registry.resolve(entity_type, entity_id)?;
        self.analytics.record_view_once(&entity_ref, view_key).await
    }

    /// Total views so far. Counts of retired kinds stay readable.
    pub async fn get_count(&self, entity_type: i16, entity_id: &str) -> CoreResult<i64> {
        let entity_ref = self.registry.resolve_stored(entity_type, entity_id)?;
        self.analytics.get_count(&entity_ref).await
    }
}
