//! In-process stores.
//!
//! Same contracts as the PostgreSQL stores, for tests and single-node
//! deployments. Each notification sits behind its own mutex, and each view
//! counter is an atomic, so writers on different entities never contend
//! beyond a brief map lookup.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use guildhall_core::analytics::{check_view_key, EntityViewAnalytics, ViewRecord};
use guildhall_core::entity::{EntityKind, EntityReference};
use guildhall_core::error::{CoreError, CoreResult};
use guildhall_core::notification::{
    next_updated_at, NewNotification, NotificationObject, NotificationPatch, StatusUpdate,
};
use guildhall_core::pagination::{clamp_limit, Page, PageOf, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use guildhall_core::registry::EntityKindRegistry;
use guildhall_core::status::{NotificationStatus, Transition};
use guildhall_core::store::{NotificationStore, ViewAnalyticsStore};
use guildhall_core::types::{now_micros, DbId, Timestamp};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

const NOTIFICATION: &str = "notification";

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

type Row = Arc<Mutex<NotificationObject>>;

/// [`NotificationStore`] held in process memory.
pub struct MemoryNotificationStore {
    registry: Arc<EntityKindRegistry>,
    next_id: AtomicI64,
    rows: RwLock<BTreeMap<DbId, Row>>,
}

impl MemoryNotificationStore {
    pub fn new(registry: Arc<EntityKindRegistry>) -> Self {
        Self {
            registry,
            next_id: AtomicI64::new(1),
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    async fn row(&self, id: DbId) -> CoreResult<Row> {
        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(NOTIFICATION, id))
    }

    /// Lock a row for mutation.
    ///
    /// Fails with `NotFound` if the row was removed while this call waited on
    /// its lock, so a write never lands on a detached row.
    async fn lock_live(&self, id: DbId) -> CoreResult<OwnedMutexGuard<NotificationObject>> {
        let row = self.row(id).await?;
        let guard = Arc::clone(&row).lock_owned().await;
        let live = self
            .rows
            .read()
            .await
            .get(&id)
            .is_some_and(|stored| Arc::ptr_eq(stored, &row));
        if !live {
            return Err(CoreError::not_found(NOTIFICATION, id));
        }
        Ok(guard)
    }

    /// Snapshot rows matching `filter`, sorted `(created_on DESC, id DESC)`,
    /// starting after the page cursor, at most `limit + 1` of them.
    async fn scan<F>(&self, page: Page, filter: F) -> Vec<NotificationObject>
    where
        F: Fn(&NotificationObject) -> bool,
    {
        let rows: Vec<Row> = self.rows.read().await.values().cloned().collect();
        let mut matched = Vec::new();
        for row in rows {
            let n = row.lock().await;
            let after_cursor = page.after.map_or(true, |c| c.precedes(n.created_on, n.id));
            if after_cursor && filter(&n) {
                matched.push(n.clone());
            }
        }
        matched.sort_by(|a, b| (b.created_on, b.id).cmp(&(a.created_on, a.id)));
        matched.truncate(usize::try_from(page.limit + 1).unwrap_or(usize::MAX));
        matched
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn create(&self, new: NewNotification) -> CoreResult<NotificationObject> {
        self.registry.check_reference(&new.entity_ref)?;
        new.check()?;

        let now = now_micros();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created_on = new.event_time(now);
        let created = NotificationObject {
            id,
            entity_ref: new.entity_ref,
            status: NotificationStatus::Active,
            title: new.title,
            message: new.message,
            created_on,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        self.rows
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(created.clone())));

        tracing::debug!(notification_id = id, entity = %created.entity_ref, "Notification created");
        Ok(created)
    }

    async fn set_status(&self, id: DbId, status: NotificationStatus) -> CoreResult<StatusUpdate> {
        let mut n = self.lock_live(id).await?;
        let transition = n.status.transition_to(status);
        if transition != Transition::Unchanged {
            n.status = status;
            n.version += 1;
            n.updated_at = next_updated_at(n.updated_at, now_micros());
        }
        Ok(StatusUpdate {
            notification: n.clone(),
            transition,
        })
    }

    async fn update(&self, id: DbId, patch: NotificationPatch) -> CoreResult<NotificationObject> {
        patch.check()?;
        let mut n = self.lock_live(id).await?;
        if patch.changes(&n) {
            let (title, message) = patch.apply_to(&n);
            n.title = title;
            n.message = message;
            n.version += 1;
            n.updated_at = next_updated_at(n.updated_at, now_micros());
        }
        Ok(n.clone())
    }

    async fn get_by_id(&self, id: DbId) -> CoreResult<NotificationObject> {
        let row = self.row(id).await?;
        let n = row.lock().await;
        Ok(n.clone())
    }

    async fn list_by_entity(
        &self,
        entity_ref: &EntityReference,
        status: Option<NotificationStatus>,
        page: Page,
    ) -> CoreResult<PageOf<NotificationObject>> {
        let rows = self
            .scan(page, |n| {
                n.entity_ref == *entity_ref && status.map_or(true, |s| n.status == s)
            })
            .await;
        Ok(PageOf::from_overfetch(rows, page.limit))
    }

    async fn list_by_status(
        &self,
        status: NotificationStatus,
        page: Page,
    ) -> CoreResult<PageOf<NotificationObject>> {
        let rows = self.scan(page, |n| n.status == status).await;
        Ok(PageOf::from_overfetch(rows, page.limit))
    }

    async fn count_by_entity(
        &self,
        entity_ref: &EntityReference,
        status: Option<NotificationStatus>,
    ) -> CoreResult<i64> {
        let rows: Vec<Row> = self.rows.read().await.values().cloned().collect();
        let mut count = 0;
        for row in rows {
            let n = row.lock().await;
            if n.entity_ref == *entity_ref && status.map_or(true, |s| n.status == s) {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn hard_delete(&self, id: DbId) -> CoreResult<bool> {
        let removed = self.rows.write().await.remove(&id).is_some();
        if removed {
            tracing::info!(notification_id = id, "Notification hard-deleted");
        }
        Ok(removed)
    }

    async fn purge_inactive_before(&self, cutoff: Timestamp) -> CoreResult<u64> {
        let rows: Vec<(DbId, Row)> = self
            .rows
            .read()
            .await
            .iter()
            .map(|(id, row)| (*id, Arc::clone(row)))
            .collect();

        let mut purged = 0;
        for (id, row) in rows {
            // Re-check under the row lock: a concurrent reactivation wins.
            let n = row.lock().await;
            if n.status == NotificationStatus::Inactive && n.updated_at < cutoff {
                self.rows.write().await.remove(&id);
                purged += 1;
            }
        }
        Ok(purged)
    }
}

// ---------------------------------------------------------------------------
// View analytics
// ---------------------------------------------------------------------------

/// One entity's counter. Increments are lock-free.
struct Counter {
    id: Uuid,
    entity_ref: EntityReference,
    view_count: AtomicI64,
    created_at: Timestamp,
    first_viewed_micros: AtomicI64,
    last_viewed_micros: AtomicI64,
    /// View key to the time it was first counted.
    receipts: Mutex<HashMap<String, Timestamp>>,
}

impl Counter {
    fn new(entity_ref: EntityReference) -> Self {
        let now = now_micros();
        Self {
            // Generated here, at the storage boundary.
            id: Uuid::now_v7(),
            entity_ref,
            view_count: AtomicI64::new(0),
            created_at: now,
            first_viewed_micros: AtomicI64::new(i64::MAX),
            last_viewed_micros: AtomicI64::new(i64::MIN),
            receipts: Mutex::new(HashMap::new()),
        }
    }

    fn bump(&self) {
        let now = now_micros().timestamp_micros();
        self.view_count.fetch_add(1, Ordering::SeqCst);
        self.first_viewed_micros.fetch_min(now, Ordering::SeqCst);
        self.last_viewed_micros.fetch_max(now, Ordering::SeqCst);
    }

    fn snapshot(&self) -> EntityViewAnalytics {
        let at = |micros: i64| {
            Utc.timestamp_micros(micros)
                .single()
                .unwrap_or(self.created_at)
        };
        let last_viewed_at = at(self.last_viewed_micros.load(Ordering::SeqCst));
        EntityViewAnalytics {
            id: self.id,
            entity_ref: self.entity_ref,
            view_count: self.view_count.load(Ordering::SeqCst),
            first_viewed_at: at(self.first_viewed_micros.load(Ordering::SeqCst)),
            last_viewed_at,
            created_at: self.created_at,
            updated_at: last_viewed_at.max(self.created_at),
        }
    }
}

/// [`ViewAnalyticsStore`] held in process memory.
#[derive(Default)]
pub struct MemoryViewAnalyticsStore {
    counters: RwLock<HashMap<EntityReference, Arc<Counter>>>,
}

impl MemoryViewAnalyticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the counter for an entity, inserting it on first use.
    ///
    /// Only insertion takes the map's write lock.
    async fn counter(&self, entity_ref: &EntityReference) -> Arc<Counter> {
        if let Some(counter) = self.counters.read().await.get(entity_ref) {
            return Arc::clone(counter);
        }
        let mut counters = self.counters.write().await;
        Arc::clone(
            counters
                .entry(*entity_ref)
                .or_insert_with(|| Arc::new(Counter::new(*entity_ref))),
        )
    }
}

#[async_trait]
impl ViewAnalyticsStore for MemoryViewAnalyticsStore {
    async fn record_view(&self, entity_ref: &EntityReference) -> CoreResult<EntityViewAnalytics> {
        let counter = self.counter(entity_ref).await;
        counter.bump();
        Ok(counter.snapshot())
    }

    async fn record_view_once(
        &self,
        entity_ref: &EntityReference,
        view_key: &str,
    ) -> CoreResult<ViewRecord> {
        check_view_key(view_key)?;
        let counter = self.counter(entity_ref).await;
        let counted = {
            let mut receipts = counter.receipts.lock().await;
            let fresh = !receipts.contains_key(view_key);
            if fresh {
                receipts.insert(view_key.to_string(), now_micros());
                counter.bump();
            }
            fresh
        };
        if !counted {
            tracing::debug!(entity = %entity_ref, view_key, "Duplicate view key, not counted");
        }
        Ok(ViewRecord {
            analytics: counter.snapshot(),
            counted,
        })
    }

    async fn get(&self, entity_ref: &EntityReference) -> CoreResult<Option<EntityViewAnalytics>> {
        Ok(self
            .counters
            .read()
            .await
            .get(entity_ref)
            .filter(|c| c.view_count.load(Ordering::SeqCst) > 0)
            .map(|c| c.snapshot()))
    }

    async fn get_count(&self, entity_ref: &EntityReference) -> CoreResult<i64> {
        Ok(self
            .counters
            .read()
            .await
            .get(entity_ref)
            .map_or(0, |c| c.view_count.load(Ordering::SeqCst)))
    }

    async fn top_viewed(&self, kind: EntityKind, limit: i64) -> CoreResult<Vec<EntityViewAnalytics>> {
        let limit = clamp_limit(Some(limit), DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
        let mut snapshots: Vec<EntityViewAnalytics> = self
            .counters
            .read()
            .await
            .values()
            .filter(|c| c.entity_ref.entity_type() == kind)
            .map(|c| c.snapshot())
            .filter(|a| a.view_count > 0)
            .collect();
        snapshots.sort_by(|a, b| {
            b.view_count
                .cmp(&a.view_count)
                .then(b.last_viewed_at.cmp(&a.last_viewed_at))
        });
        snapshots.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(snapshots)
    }

    async fn purge_view_receipts_before(&self, cutoff: Timestamp) -> CoreResult<u64> {
        let counters: Vec<Arc<Counter>> = self.counters.read().await.values().cloned().collect();
        let mut purged = 0u64;
        for counter in counters {
            let mut receipts = counter.receipts.lock().await;
            let before = receipts.len();
            receipts.retain(|_, seen_at| *seen_at >= cutoff);
            purged += (before - receipts.len()) as u64;
        }
        Ok(purged)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
